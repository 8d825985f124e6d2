//! Quantities computed from a flow field on demand.

use serde::Serialize;

use crate::domain::FlowField;
use crate::error::{CfdError, CfdResult};

/// Aggregates of one sampled quantity. Indices point at the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub sum: f64,
    pub count: usize,
    pub min_index: usize,
    pub max_index: usize,
}

pub fn calculate_field_statistics(data: &[f64]) -> CfdResult<FieldStats> {
    let (&first, rest) = data
        .split_first()
        .ok_or_else(|| CfdError::InvalidArgument("cannot compute statistics of an empty field".to_string()))?;
    let mut stats = FieldStats {
        min: first,
        max: first,
        avg: 0.0,
        sum: first,
        count: data.len(),
        min_index: 0,
        max_index: 0,
    };
    for (offset, &value) in rest.iter().enumerate() {
        if value < stats.min {
            stats.min = value;
            stats.min_index = offset + 1;
        }
        if value > stats.max {
            stats.max = value;
            stats.max_index = offset + 1;
        }
        stats.sum += value;
    }
    stats.avg = stats.sum / data.len() as f64;
    Ok(stats)
}

/// `sqrt(u^2 + v^2)` per sample. The slices must be the same length.
pub fn velocity_magnitude(u: &[f64], v: &[f64]) -> CfdResult<Vec<f64>> {
    if u.len() != v.len() {
        return Err(CfdError::InvalidArgument(format!(
            "velocity components differ in length: {} vs {}",
            u.len(),
            v.len()
        )));
    }
    Ok(u.iter().zip(v).map(|(a, b)| (a * a + b * b).sqrt()).collect())
}

pub fn compute_velocity_magnitude(field: &FlowField) -> Vec<f64> {
    field
        .u_slice()
        .iter()
        .zip(field.v_slice())
        .map(|(a, b)| (a * a + b * b).sqrt())
        .collect()
}

/// Fields derived from a [`FlowField`], filled in as they are computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    pub velocity_magnitude: Option<Vec<f64>>,
}

impl DerivedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_velocity_magnitude(&mut self, field: &FlowField) -> &[f64] {
        self.velocity_magnitude.insert(compute_velocity_magnitude(field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowStatistics {
    pub u: FieldStats,
    pub v: FieldStats,
    pub p: FieldStats,
    /// Present only when the magnitude was computed beforehand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_magnitude: Option<FieldStats>,
}

pub fn compute_statistics(field: &FlowField, derived: &DerivedFields) -> CfdResult<FlowStatistics> {
    let velocity_magnitude = match &derived.velocity_magnitude {
        Some(magnitude) => {
            if magnitude.len() != field.len() {
                return Err(CfdError::InvalidArgument(format!(
                    "derived magnitude has {} samples but the field has {}",
                    magnitude.len(),
                    field.len()
                )));
            }
            Some(calculate_field_statistics(magnitude)?)
        }
        None => None,
    };
    Ok(FlowStatistics {
        u: calculate_field_statistics(field.u_slice())?,
        v: calculate_field_statistics(field.v_slice())?,
        p: calculate_field_statistics(field.p_slice())?,
        velocity_magnitude,
    })
}

/// Magnitude plus all four statistics in one call.
pub fn compute_flow_statistics(field: &FlowField) -> CfdResult<FlowStatistics> {
    let mut derived = DerivedFields::new();
    derived.compute_velocity_magnitude(field);
    compute_statistics(field, &derived)
}
