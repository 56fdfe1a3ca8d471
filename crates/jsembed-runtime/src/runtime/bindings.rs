//! Host capability bridge
//!
//! The native functions every execution environment exposes to scripts, bound
//! on a single global object named [`HOST_UTILS`]:
//!
//! - `hostUtils.formatCurrency(amount)` - `"$1234.50"`, negatives as `"-$1.50"`
//! - `hostUtils.getCurrentTimestamp()` - milliseconds since the Unix epoch
//! - `hostUtils.generateUUID()` - random v4 UUID string
//! - `hostUtils.calculateTax(amount, rate)` - `amount * rate`
//!
//! Nothing else on the host side is reachable from a script. The object is
//! frozen and the global can be neither reassigned nor deleted.

use rquickjs::{convert::Coerced, Ctx, Function, Object};
use std::time::SystemTime;

/// Global name the bridge is bound under. Caller bindings may not use it.
pub const HOST_UTILS: &str = "hostUtils";

/// Runs before any caller code, so the intrinsics it touches are pristine.
const INSTALL_SOURCE: &str = r#"(function (utils) {
    Object.defineProperty(globalThis, 'hostUtils', {
        value: Object.freeze(utils),
        writable: false,
        enumerable: false,
        configurable: false
    });
})"#;

pub(crate) fn install_host_utils(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let utils = Object::new(ctx.clone())?;
    utils.set("formatCurrency", Function::new(ctx.clone(), format_currency)?)?;
    utils.set("getCurrentTimestamp", Function::new(ctx.clone(), current_timestamp)?)?;
    utils.set("generateUUID", Function::new(ctx.clone(), generate_uuid)?)?;
    utils.set("calculateTax", Function::new(ctx.clone(), calculate_tax)?)?;

    let install: Function = ctx.eval(INSTALL_SOURCE)?;
    install.call::<_, ()>((utils,))
}

/// `$` followed by two decimals; the sign goes in front of the symbol.
pub fn format_currency_string(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

fn format_currency(amount: Coerced<f64>) -> String {
    format_currency_string(amount.0)
}

fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn calculate_tax(amount: Coerced<f64>, rate: Coerced<f64>) -> f64 {
    amount.0 * rate.0
}
