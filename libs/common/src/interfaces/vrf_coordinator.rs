use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IVRFCoordinator {
        #[derive(Debug)]
        struct OutputServed {
            uint64 height;
            uint24 confirmationDelay;
            uint256 proofG1X;
            uint256 proofG1Y;
        }

        function i_beaconPeriodBlocks() external view returns (uint256);

        function getConfirmationDelays() external view returns (uint24[8] memory);

        #[derive(Debug)]
        event RandomnessRequested(
            uint256 indexed requestID,
            address requester,
            uint64 nextBeaconOutputHeight,
            uint24 confDelay,
            uint256 subID,
            uint16 numWords,
            uint256 costJuels,
            uint256 newSubBalance
        );

        #[derive(Debug)]
        event RandomnessFulfillmentRequested(
            uint256 indexed requestID,
            address requester,
            uint64 nextBeaconOutputHeight,
            uint24 confDelay,
            uint256 subID,
            uint16 numWords,
            uint32 gasAllowance,
            uint256 gasPrice,
            uint256 weiPerUnitLink,
            bytes arguments,
            uint256 costJuels,
            uint256 newSubBalance
        );

        // successfulFulfillment is a bitmap-like byte string, one byte per request.
        #[derive(Debug)]
        event RandomWordsFulfilled(
            uint256[] requestIDs,
            bytes successfulFulfillment,
            bytes[] truncatedErrorData,
            uint96[] subBalances,
            uint256[] subIDs
        );

        #[derive(Debug)]
        event OutputsServed(
            uint64 recentBlockHeight,
            uint192 juelsPerFeeCoin,
            uint64 reasonableGasPrice,
            OutputServed[] outputsServed
        );
    }
}
