// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use alloy::primitives::U256;

/// Quadratic bonding curve: a share at supply `k` costs `k^2 / 16000` ETH,
/// so `amount` shares from `supply` cost the partial sum of squares over
/// `[supply, supply + amount)`. All math in U256 wei; floats never touch
/// prices.
const CURVE_DIVISOR: u64 = 16_000;

/// Protocol and subject each take this percentage of the raw price.
const FEE_PERCENT: u64 = 5;

fn sum_of_squares(n: U256) -> U256 {
    n * (n + U256::ONE) * (U256::from(2) * n + U256::ONE) / U256::from(6)
}

fn fee(price: U256) -> U256 {
    price * U256::from(FEE_PERCENT) / U256::from(100)
}

/// Raw price in wei for `amount` shares starting at `supply` outstanding.
pub fn price(supply: u64, amount: u64) -> U256 {
    if amount == 0 {
        return U256::ZERO;
    }
    let below = if supply == 0 {
        U256::ZERO
    } else {
        sum_of_squares(U256::from(supply - 1))
    };
    let upto = sum_of_squares(U256::from(supply) + U256::from(amount) - U256::ONE);
    let wei_per_eth = U256::from(1_000_000_000_000_000_000u64);
    (upto - below) * wei_per_eth / U256::from(CURVE_DIVISOR)
}

/// Buy cost including both protocol and subject fees.
pub fn buy_price_after_fee(supply: u64, amount: u64) -> U256 {
    let p = price(supply, amount);
    p + fee(p) + fee(p)
}

/// Raw proceeds of selling `amount` shares back into a supply of `supply`.
/// Selling more than the outstanding supply prices at zero.
pub fn sell_price(supply: u64, amount: u64) -> U256 {
    match supply.checked_sub(amount) {
        Some(base) => price(base, amount),
        None => U256::ZERO,
    }
}

/// Sell proceeds net of both fees. Never underflows: the two fees sum to
/// at most 10% of the raw price.
pub fn sell_price_after_fee(supply: u64, amount: u64) -> U256 {
    let p = sell_price(supply, amount);
    p - fee(p) - fee(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_price_wei(supply: u64, amount: u64) -> U256 {
        let squares: u128 = (supply..supply + amount).map(|k| (k as u128) * (k as u128)).sum();
        U256::from(squares * 1_000_000_000_000_000_000u128 / 16_000)
    }

    #[test]
    fn first_share_is_free() {
        assert_eq!(price(0, 1), U256::ZERO);
        assert_eq!(buy_price_after_fee(0, 1), U256::ZERO);
    }

    #[test]
    fn second_share_costs_one_sixteen_thousandth_eth() {
        assert_eq!(price(1, 1), U256::from(62_500_000_000_000u64));
    }

    #[test]
    fn zero_amount_prices_at_zero() {
        assert_eq!(price(7, 0), U256::ZERO);
        assert_eq!(price(0, 0), U256::ZERO);
    }

    #[test]
    fn partial_sums_match_direct_summation() {
        for supply in 0..=12u64 {
            for amount in 1..=4u64 {
                assert_eq!(
                    price(supply, amount),
                    brute_price_wei(supply, amount),
                    "supply={supply} amount={amount}"
                );
            }
        }
    }

    #[test]
    fn buy_price_adds_both_fees() {
        let p = price(5, 2);
        let f = p * U256::from(5) / U256::from(100);
        assert_eq!(buy_price_after_fee(5, 2), p + f + f);
    }

    #[test]
    fn selling_beyond_supply_prices_at_zero() {
        assert_eq!(sell_price(1, 2), U256::ZERO);
        assert_eq!(sell_price_after_fee(0, 1), U256::ZERO);
    }

    #[test]
    fn sell_mirrors_buy_at_the_reduced_supply() {
        for supply in 1..=20u64 {
            for amount in 1..=supply {
                let p = price(supply - amount, amount);
                let f = p * U256::from(5) / U256::from(100);
                assert_eq!(buy_price_after_fee(supply - amount, amount), p + f + f);
                assert_eq!(sell_price_after_fee(supply, amount), p - f - f);
                assert_eq!(
                    buy_price_after_fee(supply - amount, amount)
                        - sell_price_after_fee(supply, amount),
                    U256::from(4) * f
                );
            }
        }
    }
}
