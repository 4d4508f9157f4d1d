//! Pure conversion over a supplied EUR-pivot rate table.

use rust_decimal::{Decimal, RoundingStrategy};
use tally_common::{Currency, Money, RateTable};

use crate::error::{FxError, FxResult};

/// Convert an amount between currencies through the EUR pivot.
///
/// `rates[CCY]` is units-of-CCY per 1 EUR. Intermediate arithmetic is
/// unrounded; only the returned value is rounded to the target currency's
/// minor-unit precision, half-even, to bound cumulative drift across
/// repeated conversions.
pub fn convert(
    amount: Decimal,
    from: &Currency,
    to: &Currency,
    rates: &RateTable,
) -> FxResult<Decimal> {
    if from == to {
        return Ok(amount);
    }

    let from_rate = lookup(rates, from)?;
    let to_rate = lookup(rates, to)?;

    let result = amount / from_rate * to_rate;
    Ok(result.round_dp_with_strategy(to.decimal_places(), RoundingStrategy::MidpointNearestEven))
}

/// Convert a [`Money`] amount into the target currency.
pub fn convert_money(amount: &Money, to: &Currency, rates: &RateTable) -> FxResult<Money> {
    let value = convert(amount.value, &amount.currency, to, rates)?;
    Ok(Money::new(value, to.clone()))
}

fn lookup(rates: &RateTable, currency: &Currency) -> FxResult<Decimal> {
    let rate = rates
        .get(currency)
        .ok_or_else(|| FxError::UnknownCurrency(currency.clone()))?;

    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate {
            currency: currency.clone(),
            rate,
        });
    }

    Ok(rate)
}
