//! Pure re-timing helpers for chain steps.
//!
//! None of these mutate their input. Each returns a new step list in which
//! every adjacent pair is contiguous again.

use super::step::{offset_minutes, ChainStepInstance};
use crate::error::ValidationError;

/// Change the duration of `steps[changed_index]` and cascade the difference
/// onto every later step. Earlier steps and the changed step's start are
/// untouched.
///
/// # Errors
/// Returns an error if the index is out of bounds, the duration is not
/// positive, or a cascaded time leaves the representable range.
pub fn recompute_schedule(
    steps: &[ChainStepInstance],
    changed_index: usize,
    new_duration_minutes: i64,
) -> Result<Vec<ChainStepInstance>, ValidationError> {
    let changed = steps.get(changed_index).ok_or_else(|| ValidationError::OutOfBounds {
        collection: "chain steps".to_string(),
        index: changed_index,
        len: steps.len(),
    })?;
    if new_duration_minutes <= 0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.duration_minutes", changed.step_id),
            message: format!("duration must be positive, got {new_duration_minutes}"),
        });
    }

    let mut resized = changed.clone();
    resized.duration_minutes = new_duration_minutes;
    resized.end_time = offset_minutes(resized.start_time, new_duration_minutes)?;
    let delta = resized.end_time - changed.end_time;

    let mut out = Vec::with_capacity(steps.len());
    out.extend_from_slice(&steps[..changed_index]);
    out.push(resized);
    for step in &steps[changed_index + 1..] {
        out.push(step.shifted(delta)?);
    }
    Ok(out)
}

/// Insert `step` at `index`. The inserted step starts where the previous
/// step ends (or where the old step at `index` started) and every later step
/// moves forward by its duration.
///
/// # Errors
/// Returns an error if `index > steps.len()` or a moved step leaves the
/// representable range.
pub fn insert_step(
    steps: &[ChainStepInstance],
    index: usize,
    step: ChainStepInstance,
) -> Result<Vec<ChainStepInstance>, ValidationError> {
    if index > steps.len() {
        return Err(ValidationError::OutOfBounds {
            collection: "chain steps".to_string(),
            index,
            len: steps.len(),
        });
    }

    let anchor_time = if index == 0 {
        steps.first().map(|s| s.start_time)
    } else {
        steps.get(index - 1).map(|s| s.end_time)
    }
    .unwrap_or(step.start_time);

    let mut inserted = step;
    inserted.start_time = anchor_time;
    inserted.end_time = offset_minutes(anchor_time, inserted.duration_minutes)?;
    let offset = inserted.end_time - inserted.start_time;

    let mut out = Vec::with_capacity(steps.len() + 1);
    out.extend_from_slice(&steps[..index]);
    out.push(inserted);
    for step in &steps[index..] {
        out.push(step.shifted(offset)?);
    }
    Ok(out)
}

/// `steps[i].end_time == steps[i + 1].start_time` for every adjacent pair.
pub fn is_contiguous(steps: &[ChainStepInstance]) -> bool {
    steps.windows(2).all(|w| w[0].end_time == w[1].start_time)
}
