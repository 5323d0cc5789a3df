use crate::types::FIXED8_ONE;

/// Fee rates are expressed in millionths of the traded value.
pub const FEE_RATE_SCALE: i64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
pub struct FeeConfig {
    /// Fill fee rate when the fee is charged in a non-native asset.
    pub fee_rate: i64,
    /// Fill fee rate when the fee is charged in the native asset.
    pub fee_rate_native: i64,
    /// Flat fee for expiring an aged GTC order, in native smallest units.
    pub expire_fee: i64,
    /// Flat fee for cancelling an IOC order at end of block.
    pub ioc_expire_fee: i64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: 1_000,
            fee_rate_native: 500,
            expire_fee: 1_000,
            ioc_expire_fee: 500,
        }
    }
}

/// Value of `qty` at `price`, both fixed-point, floored to the smallest unit
/// of the quote asset.
pub fn notional(price: i64, qty: i64) -> i64 {
    ((price as i128 * qty as i128) / FIXED8_ONE as i128) as i64
}

impl FeeConfig {
    pub fn fill_fee_native(&self, amount: i64) -> i64 {
        floor_rate(amount, self.fee_rate_native)
    }

    pub fn fill_fee(&self, amount: i64) -> i64 {
        floor_rate(amount, self.fee_rate)
    }
}

fn floor_rate(amount: i64, rate: i64) -> i64 {
    ((amount as i128 * rate as i128) / FEE_RATE_SCALE as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notional_floors() {
        assert_eq!(notional(102_000, 3_000_000), 3_060);
        assert_eq!(notional(1, 1), 0);
        assert_eq!(notional(99_999_999, 1), 0);
        assert_eq!(notional(100_000_000, 1), 1);
    }

    #[test]
    fn test_fill_fees_floor() {
        let fees = FeeConfig::default();

        assert_eq!(fees.fill_fee_native(3_060), 1); // 3060 * 500 / 1e6 = 1.53
        assert_eq!(fees.fill_fee(3_060), 3); // 3060 * 1000 / 1e6 = 3.06
        assert_eq!(fees.fill_fee_native(1_999), 0);
    }
}
