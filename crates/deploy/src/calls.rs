//! Method signatures of the QuackSwap contracts called during configuration.

use alloy_core::sol;

sol! {
    interface IQuack {
        function setMinter(address minter) external;
    }

    interface IDummyErc20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function renounceOwnership() external;
    }

    interface IQuackSwapFactory {
        function setFeeTo(address feeTo) external;
        function createPair(address tokenA, address tokenB) external returns (address pair);
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    interface IMasterChef {
        function addPool(uint256 allocPoint, address lpToken, address rewarder) external;
        function addPools(uint256[] allocPoints, address[] lpTokens, address[] rewarders) external;
        function setPools(
            uint256[] pids,
            uint256[] allocPoints,
            address[] rewarders,
            bool[] overwrites
        ) external;
        function deposit(uint256 pid, uint256 amount, address to) external;
    }
}
