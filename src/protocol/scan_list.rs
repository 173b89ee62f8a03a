//! Scan list and range table construction.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

use super::InstrumentCommand;

/// What a scan-list position measures, taken from the entry's low nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelFunction {
    /// Analog input 0-7.
    Analog(u8),
    /// Digital inputs.
    DigitalIn,
    /// Rate (frequency) input.
    Rate,
    /// Counter input.
    Count,
}

/// A packed 16-bit scan-list word: low nibble selects the function, high byte the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanListEntry(u16);

impl ScanListEntry {
    /// Wraps a raw scan-list word.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// The word as sent on the wire.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Channel function from the low nibble.
    pub fn function(self) -> ChannelFunction {
        match self.0 & 0xf {
            f @ 0..=7 => ChannelFunction::Analog(f as u8),
            8 => ChannelFunction::DigitalIn,
            9 => ChannelFunction::Rate,
            _ => ChannelFunction::Count,
        }
    }

    /// Range sub-index from the high byte. Rate sub-indices are 1-based.
    pub fn sub_index(self) -> usize {
        usize::from(self.0 >> 8)
    }
}

/// An entry paired with the position it should occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanSlot {
    /// Scan-list position.
    pub position: usize,
    /// Entry at that position.
    pub entry: ScanListEntry,
}

/// Ordered scan list. Position `i` is `entries[i]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanList {
    entries: Vec<ScanListEntry>,
}

impl ScanList {
    /// Builds a scan list from raw words, positions taken from their order.
    pub fn from_entries(entries: &[u16]) -> Self {
        Self {
            entries: entries.iter().copied().map(ScanListEntry::new).collect(),
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no positions are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in position order.
    pub fn entries(&self) -> &[ScanListEntry] {
        &self.entries
    }

    /// Slots in position order.
    pub fn slots(&self) -> impl Iterator<Item = ScanSlot> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(position, &entry)| ScanSlot { position, entry })
    }
}

/// Full-scale values available to the instrument model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeTables {
    /// Analog full-scale values in volts, indexed by sub-index.
    pub analog: Vec<f64>,
    /// Rate full-scale values in Hz, indexed by `sub_index - 1`.
    pub rate: Vec<f64>,
}

impl Default for RangeTables {
    /// DI-2108: fixed ±10 V analog range.
    fn default() -> Self {
        Self {
            analog: vec![10.0],
            rate: vec![
                50000.0, 20000.0, 10000.0, 5000.0, 2000.0, 1000.0, 500.0, 200.0, 100.0, 50.0,
                20.0, 10.0,
            ],
        }
    }
}

/// Per-position full-scale value, parallel to the scan list.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RangeTable(Vec<f64>);

impl RangeTable {
    /// Number of positions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values in position order.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Result of resolving a scan list: the list, its range table and the `slist` commands.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanListConfiguration {
    /// Validated scan list.
    pub scan_list: ScanList,
    /// Range table, same length as `scan_list`.
    pub range_table: RangeTable,
    /// One `slist` command per position, in position order.
    pub commands: Vec<InstrumentCommand>,
}

/// Validates slot ordering and resolves each position's full-scale value.
///
/// Positions must start at 0 and increment by one. The instrument accepts
/// anything but misbehaves silently, so ordering is enforced here.
pub fn configure_scan_list<I>(slots: I, ranges: &RangeTables) -> AppResult<ScanListConfiguration>
where
    I: IntoIterator<Item = ScanSlot>,
{
    let mut entries = Vec::new();
    let mut table = Vec::new();
    let mut commands = Vec::new();

    for (expected, slot) in slots.into_iter().enumerate() {
        if slot.position != expected {
            return Err(DaqError::ScanListOrder {
                expected,
                found: slot.position,
            });
        }

        let entry = slot.entry;
        let full_scale = match entry.function() {
            ChannelFunction::Analog(_) => *ranges.analog.get(entry.sub_index()).ok_or_else(|| {
                DaqError::Configuration(format!(
                    "scan list position {}: analog range index {} not in table of {}",
                    expected,
                    entry.sub_index(),
                    ranges.analog.len()
                ))
            })?,
            // Placeholder keeps the table aligned with the scan list.
            ChannelFunction::DigitalIn | ChannelFunction::Count => 0.0,
            ChannelFunction::Rate => *entry
                .sub_index()
                .checked_sub(1)
                .and_then(|index| ranges.rate.get(index))
                .ok_or_else(|| {
                    DaqError::Configuration(format!(
                        "scan list position {}: rate range {} not in 1..={}",
                        expected,
                        entry.sub_index(),
                        ranges.rate.len()
                    ))
                })?,
        };

        entries.push(entry);
        table.push(full_scale);
        commands.push(InstrumentCommand::ScanList {
            position: expected,
            entry,
        });
    }

    if entries.is_empty() {
        return Err(DaqError::Configuration("scan list is empty".to_string()));
    }

    Ok(ScanListConfiguration {
        scan_list: ScanList { entries },
        range_table: RangeTable(table),
        commands,
    })
}
