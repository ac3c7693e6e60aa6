//! Column semantics: which table column means what.
//!
//! The rendered tables come in three widths. The first six columns never
//! change; wider tables append a UDP NAT type column and, rarely, a max-speed
//! column in front of it. The detected column count is therefore enough to
//! name every column.

use crate::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain meaning of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnTag {
    Group,
    Remarks,
    Loss,
    Ping,
    GooglePing,
    AvgSpeed,
    MaxSpeed,
    UdpNatType,
}

impl ColumnTag {
    /// Header label as used in the rendered table and the CSV rendering.
    pub fn label(self) -> &'static str {
        match self {
            ColumnTag::Group => "group",
            ColumnTag::Remarks => "remarks",
            ColumnTag::Loss => "loss",
            ColumnTag::Ping => "ping",
            ColumnTag::GooglePing => "google_ping",
            ColumnTag::AvgSpeed => "avg_speed",
            ColumnTag::MaxSpeed => "max_speed",
            ColumnTag::UdpNatType => "udp_nat_type",
        }
    }
}

impl fmt::Display for ColumnTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const BASE_COLUMNS: [ColumnTag; 6] = [
    ColumnTag::Group,
    ColumnTag::Remarks,
    ColumnTag::Loss,
    ColumnTag::Ping,
    ColumnTag::GooglePing,
    ColumnTag::AvgSpeed,
];

/// Ordered column semantics of one detected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<ColumnTag>,
}

impl ColumnSchema {
    /// Map a detected column count onto the fixed header lookup.
    pub fn resolve(count: usize) -> Result<Self, LayoutError> {
        let mut columns = BASE_COLUMNS.to_vec();
        match count {
            6 => {}
            7 => columns.push(ColumnTag::UdpNatType),
            8 => columns.extend([ColumnTag::MaxSpeed, ColumnTag::UdpNatType]),
            _ => return Err(LayoutError::UnsupportedColumnCount { count }),
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnTag] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, tag: ColumnTag) -> bool {
        self.columns.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, ColumnTag)> + '_ {
        self.columns.iter().copied().enumerate()
    }
}
