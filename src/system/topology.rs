//! Processor layout lookup
//!
//! Maps the CPU model name to its physical core count and core-complex (CCX)
//! grouping. Only CPUs where cross-complex latency matters need an entry;
//! everything else treats all logical cores as equally close.
//!
//! Handy resources for core configurations (the "Core config" column):
//! - https://en.wikipedia.org/wiki/Template:AMD_Ryzen_1000_series
//! - https://en.wikipedia.org/wiki/Template:AMD_Ryzen_3000_series
//! - https://en.wikipedia.org/wiki/Template:AMD_Ryzen_5000_series

use std::sync::OnceLock;

use super::affinity::get_system_core_count;

/// Physical core and core-complex layout of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorLayout {
    /// Number of physical cores
    pub physical_cores: u32,
    /// Physical cores per core complex, 0 when the CPU has no complexes
    pub cores_per_complex: u32,
}

impl ProcessorLayout {
    pub const fn new(physical_cores: u32, cores_per_complex: u32) -> Self {
        Self {
            physical_cores,
            cores_per_complex,
        }
    }

    /// Layout used for CPUs missing from the table.
    pub fn fallback(logical_cores: u32) -> Self {
        Self::new(logical_cores, 0)
    }

    pub fn has_core_complexes(&self) -> bool {
        self.cores_per_complex != 0
    }

    /// Number of core complexes; 0 when [`Self::has_core_complexes`] is false.
    pub fn number_of_complexes(&self) -> u32 {
        self.physical_cores
            .checked_div(self.cores_per_complex)
            .unwrap_or(0)
    }
}

/// Known processors, keyed by the marketing name Windows reports.
const KNOWN_LAYOUTS: &[(&str, ProcessorLayout)] = &[
    ("AMD Ryzen 5 1600 Six-Core Processor", ProcessorLayout::new(6, 3)),
    ("AMD Ryzen 5 1600X Six-Core Processor", ProcessorLayout::new(6, 3)),
    ("AMD Ryzen 7 1700 Eight-Core Processor", ProcessorLayout::new(8, 4)),
    ("AMD Ryzen 7 1700X Eight-Core Processor", ProcessorLayout::new(8, 4)),
    ("AMD Ryzen 7 1800X Eight-Core Processor", ProcessorLayout::new(8, 4)),
    ("AMD Ryzen 5 2600 Six-Core Processor", ProcessorLayout::new(6, 3)),
    ("AMD Ryzen 7 2700X Eight-Core Processor", ProcessorLayout::new(8, 4)),
    ("AMD Ryzen 5 3600 6-Core Processor", ProcessorLayout::new(6, 3)),
    ("AMD Ryzen 7 3700X 8-Core Processor", ProcessorLayout::new(8, 4)),
    ("AMD Ryzen 9 3900X 12-Core Processor", ProcessorLayout::new(12, 3)),
    ("AMD Ryzen 9 3950X 16-Core Processor", ProcessorLayout::new(16, 4)),
    ("AMD Ryzen 9 5900X 12-Core Processor", ProcessorLayout::new(12, 6)),
    ("AMD Ryzen 9 5950X 16-Core Processor", ProcessorLayout::new(16, 8)),
];

/// Looks up a CPU model name in the known-layout table.
pub fn lookup_layout(processor_name: &str) -> Option<ProcessorLayout> {
    let name = processor_name.trim();
    KNOWN_LAYOUTS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, layout)| *layout)
}

/// Where the CPU facts come from.
pub trait TopologySource: Send + Sync {
    /// Human-readable CPU model name, if the system reports one
    fn processor_name(&self) -> Option<String>;

    fn logical_processor_count(&self) -> u32;
}

/// Reads the CPU name from the registry and the core count from GetSystemInfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTopologySource;

impl TopologySource for SystemTopologySource {
    fn processor_name(&self) -> Option<String> {
        read_processor_name()
    }

    fn logical_processor_count(&self) -> u32 {
        get_system_core_count()
    }
}

#[cfg(windows)]
fn read_processor_name() -> Option<String> {
    use windows::core::w;
    use windows::Win32::System::Registry::{RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_SZ};

    let mut buffer = [0u16; 256];
    let mut size = (buffer.len() * std::mem::size_of::<u16>()) as u32;

    // SAFETY: buffer and size describe a valid, writable region.
    let status = unsafe {
        RegGetValueW(
            HKEY_LOCAL_MACHINE,
            w!("HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0"),
            w!("ProcessorNameString"),
            RRF_RT_REG_SZ,
            None,
            Some(buffer.as_mut_ptr().cast()),
            Some(&mut size as *mut u32),
        )
    };

    if status.is_err() {
        log::debug!("ProcessorNameString lookup failed: {:?}", status);
        return None;
    }

    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Some(String::from_utf16_lossy(&buffer[..len]).trim().to_string())
}

#[cfg(not(windows))]
fn read_processor_name() -> Option<String> {
    None
}

/// Resolves and memoizes the host [`ProcessorLayout`].
///
/// The topology cannot change while the program runs, so the first lookup
/// is kept for the lifetime of this provider.
pub struct ProcessorTopology {
    source: Box<dyn TopologySource>,
    layout: OnceLock<ProcessorLayout>,
}

impl ProcessorTopology {
    pub fn new(source: Box<dyn TopologySource>) -> Self {
        Self {
            source,
            layout: OnceLock::new(),
        }
    }

    pub fn current_layout(&self) -> ProcessorLayout {
        *self.layout.get_or_init(|| {
            let name = self.source.processor_name().unwrap_or_default();
            match lookup_layout(&name) {
                Some(layout) => {
                    log::debug!("Processor '{}' has layout {:?}", name, layout);
                    layout
                }
                None => {
                    let layout = ProcessorLayout::fallback(self.source.logical_processor_count());
                    log::debug!("No layout for processor '{}', using {:?}", name, layout);
                    layout
                }
            }
        })
    }

    pub fn logical_processor_count(&self) -> u32 {
        self.source.logical_processor_count()
    }
}

impl Default for ProcessorTopology {
    fn default() -> Self {
        Self::new(Box::new(SystemTopologySource))
    }
}
