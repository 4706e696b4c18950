//! Box and price estimation for a tile selection.
//!
//! Tiles are sold by the box, so the area a room needs is rounded up to a
//! whole number of boxes before pricing:
//!
//! * `boxes = ceil(area / sqft_per_box)`
//! * `price = boxes * rate * sqft_per_box`

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Estimator input as posted to `/api/estimate`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EstimateRequest {
    pub sqft_required: f64,
    pub sqft_per_box: f64,
    #[serde(default)]
    pub rate: Option<f64>,
}

/// Result of an estimate. `estimated_price` is only present when a rate was given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub calculated_boxes: u64,
    pub estimated_price: Option<f64>,
}

fn check_coverage(sqft_per_box: f64) -> AppResult<()> {
    if !sqft_per_box.is_finite() || sqft_per_box <= 0.0 {
        return Err(AppError::validation("Sq.ft per box must be greater than zero"));
    }
    Ok(())
}

/// Number of boxes needed to cover `sqft_required`.
///
/// # Errors
/// * `Validation` if the coverage is not a positive number or the area is negative
pub fn calculate_boxes(sqft_required: f64, sqft_per_box: f64) -> AppResult<u64> {
    check_coverage(sqft_per_box)?;
    if !sqft_required.is_finite() || sqft_required < 0.0 {
        return Err(AppError::validation("Required area cannot be negative"));
    }
    Ok((sqft_required / sqft_per_box).ceil() as u64)
}

/// Price of `boxes` boxes at `rate` per sq.ft.
pub fn calculate_price(boxes: u64, rate: f64, sqft_per_box: f64) -> AppResult<f64> {
    check_coverage(sqft_per_box)?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(AppError::validation("Rate cannot be negative"));
    }
    Ok(boxes as f64 * rate * sqft_per_box)
}

/// Boxes for an area and, when a rate is given, their price.
///
/// # Arguments
/// * `sqft_required` - Area to cover in sq.ft
/// * `sqft_per_box` - Coverage of one box in sq.ft
/// * `rate` - Optional price per sq.ft
///
/// # Returns
/// * `AppResult<Estimate>` - The box count and the optional price
///
/// # Errors
/// * `Validation` for a non-positive coverage or a negative area or rate
pub fn estimate(sqft_required: f64, sqft_per_box: f64, rate: Option<f64>) -> AppResult<Estimate> {
    let calculated_boxes = calculate_boxes(sqft_required, sqft_per_box)?;
    let estimated_price = rate
        .map(|rate| calculate_price(calculated_boxes, rate, sqft_per_box))
        .transpose()?;
    Ok(Estimate {
        calculated_boxes,
        estimated_price,
    })
}

impl EstimateRequest {
    pub fn run(&self) -> AppResult<Estimate> {
        estimate(self.sqft_required, self.sqft_per_box, self.rate)
    }
}
