//! Catalog of the predefined ArUco dictionaries, in OpenCV enumeration order.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Dictionary {
    Dict4x4_50,
    Dict4x4_100,
    Dict4x4_250,
    Dict4x4_1000,
    Dict5x5_50,
    Dict5x5_100,
    Dict5x5_250,
    Dict5x5_1000,
    Dict6x6_50,
    Dict6x6_100,
    Dict6x6_250,
    Dict6x6_1000,
    Dict7x7_50,
    Dict7x7_100,
    Dict7x7_250,
    Dict7x7_1000,
    ArucoOriginal,
}

/// Every dictionary the tools can cycle through.
pub const ALL: [Dictionary; 17] = [
    Dictionary::Dict4x4_50,
    Dictionary::Dict4x4_100,
    Dictionary::Dict4x4_250,
    Dictionary::Dict4x4_1000,
    Dictionary::Dict5x5_50,
    Dictionary::Dict5x5_100,
    Dictionary::Dict5x5_250,
    Dictionary::Dict5x5_1000,
    Dictionary::Dict6x6_50,
    Dictionary::Dict6x6_100,
    Dictionary::Dict6x6_250,
    Dictionary::Dict6x6_1000,
    Dictionary::Dict7x7_50,
    Dictionary::Dict7x7_100,
    Dictionary::Dict7x7_250,
    Dictionary::Dict7x7_1000,
    Dictionary::ArucoOriginal,
];

/// One dictionary per marker grid size. The larger dictionaries of a grid
/// size contain the smaller ones, so these cover the common printed sets.
pub const FAST_SUBSET: [Dictionary; 5] = [
    Dictionary::Dict4x4_50,
    Dictionary::Dict5x5_100,
    Dictionary::Dict6x6_250,
    Dictionary::Dict7x7_50,
    Dictionary::ArucoOriginal,
];

/// Index of `DICT_6X6_50`, the default of both tools.
pub const DEFAULT_INDEX: usize = 8;

impl Dictionary {
    pub fn from_index(index: usize) -> Option<Self> {
        ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dictionary::Dict4x4_50 => "DICT_4X4_50",
            Dictionary::Dict4x4_100 => "DICT_4X4_100",
            Dictionary::Dict4x4_250 => "DICT_4X4_250",
            Dictionary::Dict4x4_1000 => "DICT_4X4_1000",
            Dictionary::Dict5x5_50 => "DICT_5X5_50",
            Dictionary::Dict5x5_100 => "DICT_5X5_100",
            Dictionary::Dict5x5_250 => "DICT_5X5_250",
            Dictionary::Dict5x5_1000 => "DICT_5X5_1000",
            Dictionary::Dict6x6_50 => "DICT_6X6_50",
            Dictionary::Dict6x6_100 => "DICT_6X6_100",
            Dictionary::Dict6x6_250 => "DICT_6X6_250",
            Dictionary::Dict6x6_1000 => "DICT_6X6_1000",
            Dictionary::Dict7x7_50 => "DICT_7X7_50",
            Dictionary::Dict7x7_100 => "DICT_7X7_100",
            Dictionary::Dict7x7_250 => "DICT_7X7_250",
            Dictionary::Dict7x7_1000 => "DICT_7X7_1000",
            Dictionary::ArucoOriginal => "DICT_ARUCO_ORIGINAL",
        }
    }

    /// Number of markers, i.e. the exclusive upper bound of valid ids.
    pub fn capacity(self) -> u32 {
        match self {
            Dictionary::ArucoOriginal => 1024,
            d => match d.index() % 4 {
                0 => 50,
                1 => 100,
                2 => 250,
                _ => 1000,
            },
        }
    }

    /// Side length of the data grid in cells, excluding the border.
    pub fn marker_bits(self) -> u32 {
        match self {
            Dictionary::ArucoOriginal => 5,
            d => 4 + (d.index() / 4) as u32,
        }
    }

    /// Index into the list wrapped by `delta` steps.
    pub fn cycled(index: usize, delta: isize) -> usize {
        let n = ALL.len() as isize;
        (index as isize + delta).rem_euclid(n) as usize
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_catalog() {
        for (i, d) in ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
            assert_eq!(Dictionary::from_index(i), Some(*d));
        }
        assert_eq!(Dictionary::from_index(17), None);
    }

    #[test]
    fn default_is_6x6_50() {
        let d = Dictionary::from_index(DEFAULT_INDEX).unwrap();
        assert_eq!(d.name(), "DICT_6X6_50");
        assert_eq!(d.capacity(), 50);
        assert_eq!(d.marker_bits(), 6);
    }

    #[test]
    fn capacities_follow_name_suffix() {
        assert_eq!(Dictionary::Dict4x4_1000.capacity(), 1000);
        assert_eq!(Dictionary::Dict5x5_250.capacity(), 250);
        assert_eq!(Dictionary::Dict7x7_100.capacity(), 100);
        assert_eq!(Dictionary::ArucoOriginal.capacity(), 1024);
        assert_eq!(Dictionary::ArucoOriginal.marker_bits(), 5);
        assert_eq!(Dictionary::Dict7x7_1000.marker_bits(), 7);
    }

    #[test]
    fn cycling_wraps_both_ways() {
        assert_eq!(Dictionary::cycled(0, -1), 16);
        assert_eq!(Dictionary::cycled(16, 1), 0);
        assert_eq!(Dictionary::cycled(8, 1), 9);
    }
}
