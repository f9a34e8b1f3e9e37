//! Detection scope, acceptance policy and per-frame classification.

use std::collections::BTreeSet;

use crate::dictionary::{self, Dictionary};
use crate::keys::KeyEvent;
use crate::{DetectionSet, Quad};

const DOWNSCALE_CYCLE: [u32; 3] = [1, 2, 4];
const SKIP_CYCLE: [u32; 4] = [1, 2, 3, 4];

/// Centroids closer than this are treated as the same physical marker.
const SAME_MARKER_PX: f32 = 4.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetectionClass {
    Accepted,
    RejectedByPolicy,
    Undecoded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub id: Option<u32>,
    pub quad: Quad,
    pub dictionary: Option<Dictionary>,
    pub class: DetectionClass,
}

/// Optional allow-list of marker ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptPolicy {
    allowed: Option<BTreeSet<u32>>,
}

impl AcceptPolicy {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn allow_only(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            allowed: Some(ids.into_iter().collect()),
        }
    }

    pub fn accepts(&self, id: u32) -> bool {
        self.allowed.as_ref().map_or(true, |set| set.contains(&id))
    }
}

/// Parse a comma separated id list such as `1,2, 7`.
pub fn parse_id_list(s: &str) -> crate::Result<Vec<u32>> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<u32>()
                .map_err(|_| crate::Error::InvalidArgument(format!("invalid marker id '{t}'")))
        })
        .collect()
}

fn near(a: &Quad, b: &Quad) -> bool {
    let (ca, cb) = (a.centroid(), b.centroid());
    (ca.x - cb.x).abs() <= SAME_MARKER_PX && (ca.y - cb.y).abs() <= SAME_MARKER_PX
}

/// Apply the policy to raw engine output.
///
/// Overlapping markers reported by several dictionaries keep only the first
/// report, and undecoded candidates overlapping a decoded marker are dropped.
pub fn classify(set: DetectionSet, policy: &AcceptPolicy, include_undecoded: bool) -> Vec<Detection> {
    let mut out: Vec<Detection> = Vec::with_capacity(set.markers.len());
    for hit in set.markers {
        if out.iter().any(|d| near(&d.quad, &hit.quad)) {
            continue;
        }
        let class = if policy.accepts(hit.id) {
            DetectionClass::Accepted
        } else {
            DetectionClass::RejectedByPolicy
        };
        out.push(Detection {
            id: Some(hit.id),
            quad: hit.quad,
            dictionary: Some(hit.dictionary),
            class,
        });
    }
    if include_undecoded {
        for quad in set.rejected {
            if out.iter().any(|d| near(&d.quad, &quad)) {
                continue;
            }
            out.push(Detection {
                id: None,
                quad,
                dictionary: None,
                class: DetectionClass::Undecoded,
            });
        }
    }
    out
}

/// Hotkeys of the capture tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureHotkey {
    ToggleAllDictionaries,
    CycleDownscale,
    CycleFrameSkip,
    ToggleSingleDictionary,
    ToggleUndecoded,
    Snapshot,
}

impl CaptureHotkey {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        match key.char()? {
            b'a' | b'A' => Some(Self::ToggleAllDictionaries),
            b'z' | b'Z' => Some(Self::CycleDownscale),
            b'f' | b'F' => Some(Self::CycleFrameSkip),
            b'o' | b'O' => Some(Self::ToggleSingleDictionary),
            b'u' | b'U' => Some(Self::ToggleUndecoded),
            b'p' | b'P' => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Runtime detection parameters, changed by hotkeys and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionSettings {
    pub all_dictionaries: bool,
    pub single_dictionary: bool,
    pub primary: Dictionary,
    downscale_idx: usize,
    skip_idx: usize,
    pub show_undecoded: bool,
}

impl DetectionSettings {
    pub fn new(primary: Dictionary) -> Self {
        Self {
            all_dictionaries: false,
            single_dictionary: false,
            primary,
            downscale_idx: 0,
            skip_idx: 0,
            show_undecoded: false,
        }
    }

    /// Start at the cycle entries closest to the requested values.
    pub fn with_cycles(mut self, downscale: u32, frame_skip: u32) -> Self {
        self.downscale_idx = nearest(&DOWNSCALE_CYCLE, downscale);
        self.skip_idx = nearest(&SKIP_CYCLE, frame_skip);
        self
    }

    pub fn downscale(&self) -> u32 {
        DOWNSCALE_CYCLE[self.downscale_idx]
    }

    pub fn frame_skip(&self) -> u32 {
        SKIP_CYCLE[self.skip_idx]
    }

    pub fn dictionaries(&self) -> Vec<Dictionary> {
        if self.single_dictionary {
            vec![self.primary]
        } else if self.all_dictionaries {
            dictionary::ALL.to_vec()
        } else {
            let mut v = vec![self.primary];
            v.extend(dictionary::FAST_SUBSET.iter().filter(|d| **d != self.primary));
            v
        }
    }

    /// Whether detection runs on this frame or reuses the previous result.
    pub fn should_detect(&self, frame_index: u64) -> bool {
        frame_index % u64::from(self.frame_skip()) == 0
    }

    pub fn mode(&self) -> String {
        let scope = if self.single_dictionary {
            format!("single:{}", self.primary)
        } else if self.all_dictionaries {
            format!("all({})", dictionary::ALL.len())
        } else {
            format!("fast({})", self.dictionaries().len())
        };
        format!(
            "{scope} | ds x{} | skip {}",
            self.downscale(),
            self.frame_skip()
        )
    }

    /// Apply a settings hotkey. Returns false for keys that are not settings.
    pub fn apply(&mut self, key: CaptureHotkey) -> bool {
        match key {
            CaptureHotkey::ToggleAllDictionaries => self.all_dictionaries = !self.all_dictionaries,
            CaptureHotkey::CycleDownscale => {
                self.downscale_idx = (self.downscale_idx + 1) % DOWNSCALE_CYCLE.len()
            }
            CaptureHotkey::CycleFrameSkip => self.skip_idx = (self.skip_idx + 1) % SKIP_CYCLE.len(),
            CaptureHotkey::ToggleSingleDictionary => {
                self.single_dictionary = !self.single_dictionary
            }
            CaptureHotkey::ToggleUndecoded => self.show_undecoded = !self.show_undecoded,
            CaptureHotkey::Snapshot => return false,
        }
        true
    }
}

fn nearest(cycle: &[u32], value: u32) -> usize {
    cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| v.abs_diff(value))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkerHit, Point2};

    fn square(x: f32, y: f32) -> Quad {
        Quad([
            Point2::new(x, y),
            Point2::new(x + 20.0, y),
            Point2::new(x + 20.0, y + 20.0),
            Point2::new(x, y + 20.0),
        ])
    }

    fn hit(id: u32, x: f32, dictionary: Dictionary) -> MarkerHit {
        MarkerHit {
            id,
            quad: square(x, 10.0),
            dictionary,
        }
    }

    #[test]
    fn policy_splits_accepted_and_rejected() {
        let set = DetectionSet {
            markers: vec![hit(1, 0.0, Dictionary::Dict4x4_50), hit(2, 100.0, Dictionary::Dict4x4_50)],
            rejected: vec![],
        };
        let dets = classify(set, &AcceptPolicy::allow_only([2]), false);
        assert_eq!(dets[0].class, DetectionClass::RejectedByPolicy);
        assert_eq!(dets[1].class, DetectionClass::Accepted);
    }

    #[test]
    fn duplicate_reports_from_nested_dictionaries_collapse() {
        let set = DetectionSet {
            markers: vec![
                hit(3, 0.0, Dictionary::Dict4x4_50),
                hit(3, 1.0, Dictionary::Dict4x4_1000),
            ],
            rejected: vec![square(0.5, 10.0), square(200.0, 200.0)],
        };
        let dets = classify(set.clone(), &AcceptPolicy::accept_all(), true);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].dictionary, Some(Dictionary::Dict4x4_50));
        assert_eq!(dets[1].class, DetectionClass::Undecoded);

        let dets = classify(set, &AcceptPolicy::accept_all(), false);
        assert_eq!(dets.len(), 1);
    }

    #[test]
    fn id_list_parsing() {
        assert_eq!(parse_id_list("1, 2,7").unwrap(), vec![1, 2, 7]);
        assert_eq!(parse_id_list("").unwrap(), Vec::<u32>::new());
        assert!(parse_id_list("1,x").is_err());
    }

    #[test]
    fn scope_selection() {
        let mut s = DetectionSettings::new(Dictionary::Dict6x6_50);
        let fast = s.dictionaries();
        assert_eq!(fast[0], Dictionary::Dict6x6_50);
        assert_eq!(fast.len(), 6);

        s.apply(CaptureHotkey::ToggleAllDictionaries);
        assert_eq!(s.dictionaries().len(), 17);

        s.apply(CaptureHotkey::ToggleSingleDictionary);
        assert_eq!(s.dictionaries(), vec![Dictionary::Dict6x6_50]);
        assert!(s.mode().starts_with("single:DICT_6X6_50"));
    }

    #[test]
    fn primary_in_fast_subset_is_not_repeated() {
        let s = DetectionSettings::new(Dictionary::Dict4x4_50);
        let dicts = s.dictionaries();
        assert_eq!(dicts.len(), 5);
        assert_eq!(dicts.iter().filter(|d| **d == Dictionary::Dict4x4_50).count(), 1);
    }

    #[test]
    fn cycles_wrap() {
        let mut s = DetectionSettings::new(Dictionary::Dict6x6_50);
        let seen: Vec<u32> = (0..4)
            .map(|_| {
                let v = s.downscale();
                s.apply(CaptureHotkey::CycleDownscale);
                v
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 4, 1]);

        for _ in 0..3 {
            s.apply(CaptureHotkey::CycleFrameSkip);
        }
        assert_eq!(s.frame_skip(), 4);
        assert!(s.should_detect(8));
        assert!(!s.should_detect(9));
        s.apply(CaptureHotkey::CycleFrameSkip);
        assert_eq!(s.frame_skip(), 1);
    }

    #[test]
    fn initial_cycles_snap_to_nearest() {
        let s = DetectionSettings::new(Dictionary::Dict6x6_50).with_cycles(3, 9);
        assert_eq!(s.downscale(), 2);
        assert_eq!(s.frame_skip(), 4);
    }

    #[test]
    fn hotkeys_avoid_exit_keys() {
        for c in 0u8..=255 {
            let k = KeyEvent::Printable(c);
            if CaptureHotkey::from_key(k).is_some() {
                assert!(!k.is_exit());
            }
        }
        assert_eq!(CaptureHotkey::from_key(KeyEvent::Extended(65361)), None);
    }
}
