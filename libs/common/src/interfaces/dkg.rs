use alloy::sol;

sol! {
    interface IDKG {
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
