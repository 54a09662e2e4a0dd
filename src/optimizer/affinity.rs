//! Affinity mask planning
//!
//! Games get the "priority" cores, everything else gets the rest. Which cores
//! count as priority cores depends on the processor layout and on whether the
//! user prefers raw core count (speed) or a single core complex (latency).

use serde::{Deserialize, Serialize};

use super::bitmask::{self, BitMaskError, NATIVE_WIDTH};
use crate::constants::PRIORITY_CORE_TABLE;
use crate::system::ProcessorLayout;

/// How game affinity is chosen on CPUs with several core complexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformancePreference {
    /// Use as many cores as the core table allows
    Speed,
    /// Keep the game inside one core complex
    #[default]
    Latency,
}

/// Cores reserved for games on a CPU with `physical_cores` cores.
///
/// Core counts missing from the table reserve every core.
pub fn priority_core_count(physical_cores: u32) -> u32 {
    PRIORITY_CORE_TABLE
        .iter()
        .find(|(cores, _)| *cores == physical_cores)
        .map(|(_, priority)| *priority)
        .unwrap_or(physical_cores)
}

/// Mask for games (`want_priority`) or for everything else.
///
/// The two masks are complements of each other over the physical cores.
pub fn optimal_affinity_mask(
    layout: ProcessorLayout,
    preference: PerformancePreference,
    want_priority: bool,
) -> Result<usize, BitMaskError> {
    let priority_cores = if !layout.has_core_complexes()
        || layout.number_of_complexes() == 1
        || preference == PerformancePreference::Speed
    {
        priority_core_count(layout.physical_cores)
    } else {
        layout.cores_per_complex
    };

    if want_priority {
        bitmask::set_bit_range(0, 0, priority_cores)
    } else {
        let all = bitmask::set_bit_range(0, 0, layout.physical_cores)?;
        bitmask::unset_bit_range(all, 0, priority_cores)
    }
}

/// Mask covering logical cores `[0, logical_cores)`.
pub fn all_cores_mask(logical_cores: u32) -> Result<usize, BitMaskError> {
    bitmask::set_bit_range(0, 0, logical_cores.min(NATIVE_WIDTH))
}

/// Builds a mask from a list of core indices.
///
/// With `invert` the mask starts from every available core and the listed
/// cores are removed instead.
pub fn affinity_mask_from_cores(
    cores: &[u32],
    available_cores: u32,
    invert: bool,
) -> Result<usize, BitMaskError> {
    if let Some(&core) = cores.iter().find(|&&core| core >= available_cores) {
        return Err(BitMaskError::Range {
            start: core,
            count: 1,
            width: available_cores,
        });
    }

    if invert {
        let all = bitmask::set_bit_range(0, 0, available_cores)?;
        Ok(cores
            .iter()
            .fold(all, |mask, &core| bitmask::unset_bit(mask, core)))
    } else {
        Ok(cores
            .iter()
            .fold(0, |mask, &core| bitmask::set_bit(mask, core)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::bitmask::{logical_binary_complement, padded_binary};

    #[test]
    fn test_priority_core_table() {
        assert_eq!(priority_core_count(8), 6);
        assert_eq!(priority_core_count(32), 24);
        assert_eq!(priority_core_count(10), 10);
    }

    #[test]
    fn test_masks_without_core_complexes() {
        let layout = ProcessorLayout::fallback(8);
        let game = optimal_affinity_mask(layout, PerformancePreference::Latency, true).unwrap();
        let other = optimal_affinity_mask(layout, PerformancePreference::Latency, false).unwrap();

        assert_eq!(game, 0b0011_1111);
        assert_eq!(other, 0b1100_0000);
        assert!(logical_binary_complement(&padded_binary(game), &padded_binary(other)).unwrap());
    }

    #[test]
    fn test_latency_isolates_one_complex() {
        // 5950X: 16 cores in two complexes of 8
        let layout = ProcessorLayout::new(16, 8);
        let game = optimal_affinity_mask(layout, PerformancePreference::Latency, true).unwrap();
        let other = optimal_affinity_mask(layout, PerformancePreference::Latency, false).unwrap();

        assert_eq!(game, 0x00FF);
        assert_eq!(other, 0xFF00);
    }

    #[test]
    fn test_speed_uses_core_table() {
        let layout = ProcessorLayout::new(16, 8);
        let game = optimal_affinity_mask(layout, PerformancePreference::Speed, true).unwrap();
        let other = optimal_affinity_mask(layout, PerformancePreference::Speed, false).unwrap();

        assert_eq!(game, 0x0FFF);
        assert_eq!(other, 0xF000);
    }

    #[test]
    fn test_single_complex_uses_core_table() {
        let layout = ProcessorLayout::new(8, 8);
        let game = optimal_affinity_mask(layout, PerformancePreference::Latency, true).unwrap();
        assert_eq!(game, 0b0011_1111);
    }

    #[test]
    fn test_unknown_core_count_leaves_nothing_for_others() {
        let layout = ProcessorLayout::fallback(10);
        let other = optimal_affinity_mask(layout, PerformancePreference::Latency, false).unwrap();
        assert_eq!(other, 0);
    }

    #[test]
    fn test_mask_from_cores() {
        assert_eq!(affinity_mask_from_cores(&[0, 2], 4, false).unwrap(), 0b0101);
        assert_eq!(affinity_mask_from_cores(&[0, 2], 4, true).unwrap(), 0b1010);
        assert_eq!(affinity_mask_from_cores(&[], 4, true).unwrap(), 0b1111);
        assert!(matches!(
            affinity_mask_from_cores(&[4], 4, false),
            Err(BitMaskError::Range { start: 4, .. })
        ));
    }

    #[test]
    fn test_all_cores_mask() {
        assert_eq!(all_cores_mask(4).unwrap(), 0b1111);
        assert_eq!(all_cores_mask(NATIVE_WIDTH + 8).unwrap(), usize::MAX);
    }

    #[test]
    fn test_preference_serde_names() {
        assert_eq!(
            serde_json::to_string(&PerformancePreference::Latency).unwrap(),
            "\"latency\""
        );
        let parsed: PerformancePreference = serde_json::from_str("\"speed\"").unwrap();
        assert_eq!(parsed, PerformancePreference::Speed);
    }
}
