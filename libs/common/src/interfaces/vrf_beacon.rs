use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IVRFBeacon {
        function s_provingKeyHash() external view returns (bytes32);

        function s_keyID() external view returns (bytes32);

        #[derive(Debug)]
        event NewTransmission(
            uint40 indexed epochAndRound,
            address transmitter,
            uint192 juelsPerFeeCoin,
            uint64 reasonableGasPrice,
            bytes32 configDigest
        );

        #[derive(Debug)]
        event ConfigSet(
            uint32 previousConfigBlockNumber,
            bytes32 configDigest,
            uint64 configCount,
            address[] signers,
            address[] transmitters,
            uint8 f,
            bytes onchainConfig,
            uint64 offchainConfigVersion,
            bytes offchainConfig
        );
    }
}
