use anyhow::{Result, bail};

use crema_core::brewing::{TestShot, dial_in, target_yield};

use super::helpers::print_json;

pub(crate) fn cmd_yield(dose: f64, ratio: f64, json: bool) -> Result<()> {
    let Some(grams) = target_yield(dose, ratio) else {
        bail!("Dose and ratio must both be non-zero numbers");
    };
    if json {
        return print_json(&serde_json::json!({ "dose": dose, "ratio": ratio, "yield": grams }));
    }
    println!("Target yield: {grams:.1}g ({dose}g in at 1:{ratio})");
    Ok(())
}

pub(crate) fn cmd_dial_in(target: f64, first: TestShot, second: TestShot, json: bool) -> Result<()> {
    let grind = dial_in(target, first, second)?;
    if json {
        return print_json(&serde_json::json!({ "target_seconds": target, "grind": grind }));
    }
    println!("Suggested grind setting for {target}s: {grind:.2}");
    if grind < first.grind.min(second.grind) || grind > first.grind.max(second.grind) {
        println!("  Outside your test shots; pull one more shot to confirm");
    }
    Ok(())
}
