//! Design payload: technical yield and cost.
//!
//! Canonical shape:
//!
//! ```json
//! {
//!   "agent": "design",
//!   "coordinates": { "lat": 0.0, "lon": 0.0 },
//!   "yield_inputs": { "capacity_kw": 50.0, "ac_annual_kwh": 75000.0 },
//!   "design": { "specific_yield_kwh_per_kw": 1500.0, "estimated_lcoe_usd_per_kwh": 0.032, "score": 100, ... }
//! }
//! ```
//!
//! ## Score
//!
//! Starts at 100; minus 20 when specific yield is below 1000 kWh/kW,
//! minus 15 when LCOE exceeds 0.08 USD/kWh.
//!
//! The payload depends only on the site's coordinates, never on the address
//! text, so it can be shared between addresses at the same location.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::number_or;
use crate::types::Coordinates;

const DC_TO_AC_RATIO: f64 = 1.2;
const COST_PER_KW_USD: f64 = 1200.0;
const LIFETIME_YEARS: f64 = 25.0;
const MIN_SPECIFIC_YIELD: f64 = 1000.0;
const MAX_LCOE: f64 = 0.08;

/// Production estimate a design is based on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct YieldInputs {
    /// DC nameplate capacity in kW
    #[serde(default = "default_capacity")]
    pub capacity_kw: f64,

    /// Estimated AC energy per year in kWh
    #[serde(default = "default_ac_annual")]
    pub ac_annual_kwh: f64,
}

fn default_capacity() -> f64 {
    50.0
}

fn default_ac_annual() -> f64 {
    70_000.0
}

impl Default for YieldInputs {
    fn default() -> Self {
        Self {
            capacity_kw: default_capacity(),
            ac_annual_kwh: default_ac_annual(),
        }
    }
}

/// Build the design used when summarizer output is not JSON.
pub fn design_fallback(inputs: &YieldInputs) -> Map<String, JsonValue> {
    let cap = inputs.capacity_kw;
    let prod = inputs.ac_annual_kwh;
    let cost = cap * COST_PER_KW_USD;
    let specific_yield = if cap > 0.0 { prod / cap } else { 0.0 };
    let lcoe = if prod > 0.0 {
        cost / (prod * LIFETIME_YEARS)
    } else {
        0.0
    };

    let mut design = Map::new();
    design.insert("system_capacity_kwdc".to_string(), json!(cap));
    design.insert(
        "system_capacity_kwac".to_string(),
        json!(round_to(cap / DC_TO_AC_RATIO, 2)),
    );
    design.insert("annual_production_kwh".to_string(), json!(prod));
    design.insert(
        "specific_yield_kwh_per_kw".to_string(),
        json!(round_to(specific_yield, 2)),
    );
    design.insert("estimated_cost_usd".to_string(), json!(round_to(cost, 2)));
    design.insert(
        "estimated_lcoe_usd_per_kwh".to_string(),
        json!(round_to(lcoe, 3)),
    );
    design.insert(
        "bill_of_materials".to_string(),
        json!({
            "modules": { "quantity": 125, "model": "400W Mono", "power_w": 400 },
            "inverters": { "quantity": 5, "model": "10kW string inverter", "capacity_kw": 10 },
            "racking": { "type": "Roof Mount", "material": "Aluminum" },
            "bos": ["DC Disconnect", "AC Disconnect", "Wiring", "Combiner Box"],
        }),
    );
    design.insert(
        "design_notes".to_string(),
        json!([
            "Fallback design used due to unparsable summarizer output.",
            "Default performance ratios assumed.",
            "Cost based on $1.2/Wdc industry benchmark.",
        ]),
    );
    design
}

/// Attach the deterministic performance score to a design.
pub fn score_design(mut design: Map<String, JsonValue>) -> Map<String, JsonValue> {
    let score = design_score(&design);
    design.insert("score".to_string(), json!(score));
    design
}

/// Deterministic performance score (100 = excellent).
pub fn design_score(design: &Map<String, JsonValue>) -> i64 {
    let specific_yield = number_or(design.get("specific_yield_kwh_per_kw"), 0.0);
    let lcoe = number_or(design.get("estimated_lcoe_usd_per_kwh"), 0.0);

    let mut score = 100;
    if specific_yield < MIN_SPECIFIC_YIELD {
        score -= 20;
    }
    if lcoe > MAX_LCOE {
        score -= 15;
    }
    score
}

/// Assemble the canonical design payload.
pub fn design_payload(
    coordinates: Coordinates,
    inputs: &YieldInputs,
    design: Map<String, JsonValue>,
) -> JsonValue {
    json!({
        "agent": "design",
        "coordinates": coordinates,
        "yield_inputs": inputs,
        "design": JsonValue::Object(design),
    })
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
