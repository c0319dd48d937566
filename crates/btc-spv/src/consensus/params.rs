use crate::pow::Target;

/// Consensus parameters the oracle validates against.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    /// Expected duration of one retargeting period, in seconds.
    pub pow_target_timespan: u32,
    /// Number of blocks between difficulty recalculations.
    pub difficulty_adjustment_interval: u64,
    /// The maximum attainable target value.
    pub pow_limit: Target,
    /// Confirmations a block needs, counting itself, before it is treated
    /// as final.
    pub min_confirmations: u64,
}

impl Params {
    /// Consensus parameters for the Bitcoin mainnet network.
    pub const BITCOIN: Self = Self {
        pow_target_timespan: 14 * 24 * 60 * 60, // two weeks
        difficulty_adjustment_interval: 2016,
        // The unrounded 224-bit maximum target,
        // 0x00000000ffff...ff, stored as little-endian 64-bit limbs.
        pow_limit: Target::from_limbs([u64::MAX, u64::MAX, u64::MAX, 0x0000_0000_ffff_ffff]),
        min_confirmations: 6,
    };
}

#[cfg(test)]
mod tests {
    use crate::pow::CompactTarget;

    use super::*;

    #[test]
    fn test_bitcoin_params() {
        let params = Params::BITCOIN;
        assert_eq!(params.pow_target_timespan, 1_209_600);
        assert_eq!(params.difficulty_adjustment_interval, 2016);
        assert_eq!(params.min_confirmations, 6);
        assert_eq!(
            Some(params.pow_limit),
            Target::from_hex("00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff")
        );
    }

    #[test]
    fn test_pow_limit_rounds_to_genesis_bits() {
        // The unrounded limit loses its low mantissa bits in compact form.
        assert_eq!(
            Params::BITCOIN.pow_limit.to_compact(),
            CompactTarget::new(0x1d00ffff)
        );
    }
}
