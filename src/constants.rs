//! Chain-level constants shared across modules.

/// Wrapped SOL mint - the canonical quote asset on Solana
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Canonical USDC mint
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wQ1Y1AoG6CwY";

/// Canonical USDT mint
pub const USDT_MINT: &str = "Es9vMFrzaCERzsiDMHcRWNtNeBNZ6qKqc7C6dQY9jz4";

/// Raydium AMM v4 program - primary pool-creation event source
pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Pump.fun bonding curve program
pub const PUMPFUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Log fragments that identify a pool-creation transaction
pub const POOL_BIRTH_KEYWORDS: &[&str] = &[
    "createpool",
    "initializepool",
    "initialize_pool",
    "pool-init",
    "open_pool",
    "initialize2",
];

/// Known quote/base assets that are never themselves "discovered tokens"
pub fn is_known_quote_mint(mint: &str) -> bool {
    mint == SOL_MINT || mint == USDC_MINT || mint == USDT_MINT
}

/// Validate a base58-encoded Solana address (32 bytes)
pub fn is_valid_address(candidate: &str) -> bool {
    if candidate.len() < 32 || candidate.len() > 44 {
        return false;
    }
    match bs58::decode(candidate).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_mints_are_valid_addresses() {
        assert!(is_valid_address(SOL_MINT));
        assert!(is_valid_address(USDC_MINT));
        assert!(is_valid_address(USDT_MINT));
    }

    #[test]
    fn test_invalid_addresses_rejected() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("short"));
        assert!(!is_valid_address("0x0000000000000000000000000000000000000000"));
        // 'l' is not in the base58 alphabet
        assert!(!is_valid_address("l1111111111111111111111111111111111111111"));
    }
}
