//! Orbit and frame selection arithmetic.
//!
//! Every orbit is split into eight frames `A` to `H`. Users select data by
//! orbit numbers, frame letters, single orbit-and-frame tokens like `00981E`,
//! or a contiguous range between two such tokens. All of these normalise into
//! a set of [`OrbitFrame`] pairs, which then partitions into complete orbits
//! (all eight frames wanted) and incomplete ones grouped by frame.
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const MAX_ORBIT_NUMBER: u32 = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Frame {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Frame {
    pub const ALL: [Frame; 8] = [
        Frame::A,
        Frame::B,
        Frame::C,
        Frame::D,
        Frame::E,
        Frame::F,
        Frame::G,
        Frame::H,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    pub fn from_letter(letter: char) -> Result<Self> {
        let upper = letter.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.letter() == upper)
            .ok_or_else(|| Error::invalid_input(format!("invalid frame ID '{letter}' (expected A-H)")))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Frame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Self::from_letter(letter),
            _ => Err(Error::invalid_input(format!(
                "invalid frame ID '{s}' (expected a single letter A-H)"
            ))),
        }
    }
}

pub fn validate_orbit_number(orbit: i64) -> Result<u32> {
    u32::try_from(orbit)
        .ok()
        .filter(|o| *o <= MAX_ORBIT_NUMBER)
        .ok_or_else(|| {
            Error::invalid_input(format!(
                "orbit number {orbit} is out of range (0-{MAX_ORBIT_NUMBER})"
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrbitFrame {
    pub orbit: u32,
    pub frame: Frame,
}

impl OrbitFrame {
    pub fn new(orbit: u32, frame: Frame) -> Self {
        Self { orbit, frame }
    }
}

impl fmt::Display for OrbitFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05}{}", self.orbit, self.frame)
    }
}

impl FromStr for OrbitFrame {
    type Err = Error;

    /// Parses tokens like `00981E` or `981e`.
    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let invalid = || {
            Error::invalid_input(format!(
                "invalid orbit and frame '{s}' (expected e.g. 00981E)"
            ))
        };
        let letter = token.chars().last().ok_or_else(invalid)?;
        let digits = &token[..token.len() - letter.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let orbit = digits.parse::<i64>().map_err(|_| invalid())?;
        Ok(Self {
            orbit: validate_orbit_number(orbit)?,
            frame: Frame::from_letter(letter)?,
        })
    }
}

/// Frames from `start` to `end` inclusive. The eight frames are cyclic, so
/// an `end` before `start` wraps around through `H` and `A`.
pub fn frame_range(start: Frame, end: Frame) -> Vec<Frame> {
    let first = start.index();
    let mut last = end.index();
    if last < first {
        last += Frame::ALL.len();
    }
    (first..=last)
        .map(|i| Frame::ALL[i % Frame::ALL.len()])
        .collect()
}

/// Every orbit-and-frame pair between two tokens, inclusive.
pub fn expand_orbit_and_frame_range(start: OrbitFrame, end: OrbitFrame) -> Result<Vec<OrbitFrame>> {
    if start.orbit == end.orbit {
        return Ok(frame_range(start.frame, end.frame)
            .into_iter()
            .map(|f| OrbitFrame::new(start.orbit, f))
            .collect());
    }
    if end.orbit < start.orbit {
        return Err(Error::invalid_input(format!(
            "orbit and frame range ends ({end}) before it starts ({start})"
        )));
    }

    let mut pairs: Vec<OrbitFrame> = frame_range(start.frame, Frame::H)
        .into_iter()
        .map(|f| OrbitFrame::new(start.orbit, f))
        .collect();
    for orbit in start.orbit + 1..end.orbit {
        pairs.extend(Frame::ALL.iter().map(|f| OrbitFrame::new(orbit, *f)));
    }
    pairs.extend(
        frame_range(Frame::A, end.frame)
            .into_iter()
            .map(|f| OrbitFrame::new(end.orbit, f)),
    );
    Ok(pairs)
}

/// Merges the orbit selectors into one deduplicated, sorted pair list:
/// `orbits` x `frames` (all eight when `frames` is empty), the explicit
/// `orbit_and_frames` tokens, and the expanded `range`.
///
/// A range cannot be combined with separate orbit numbers or frame letters;
/// explicit tokens may be combined with it.
pub fn combine_orbit_frame_inputs(
    orbits: &[u32],
    frames: &[Frame],
    orbit_and_frames: &[OrbitFrame],
    range: Option<(OrbitFrame, OrbitFrame)>,
) -> Result<Vec<OrbitFrame>> {
    if range.is_some() && (!orbits.is_empty() || !frames.is_empty()) {
        return Err(Error::invalid_input(
            "an orbit and frame range cannot be combined with separate orbit numbers or frame IDs",
        ));
    }

    let mut pairs = BTreeSet::new();
    if !orbits.is_empty() {
        let frames = if frames.is_empty() { &Frame::ALL[..] } else { frames };
        for orbit in orbits {
            for frame in frames {
                pairs.insert(OrbitFrame::new(*orbit, *frame));
            }
        }
    }
    pairs.extend(orbit_and_frames.iter().copied());
    if let Some((start, end)) = range {
        pairs.extend(expand_orbit_and_frame_range(start, end)?);
    }
    Ok(pairs.into_iter().collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrbitPartition {
    /// Orbits with all eight frames selected.
    pub complete: Vec<u32>,
    /// Remaining orbits keyed by each selected frame.
    pub incomplete: BTreeMap<Frame, Vec<u32>>,
}

impl OrbitPartition {
    pub fn is_empty(&self) -> bool {
        self.complete.is_empty() && self.incomplete.is_empty()
    }
}

pub fn partition_complete_incomplete(pairs: &[OrbitFrame]) -> OrbitPartition {
    let mut by_orbit: BTreeMap<u32, BTreeSet<Frame>> = BTreeMap::new();
    for pair in pairs {
        by_orbit.entry(pair.orbit).or_default().insert(pair.frame);
    }

    let mut partition = OrbitPartition::default();
    for (orbit, frames) in by_orbit {
        if frames.len() == Frame::ALL.len() {
            partition.complete.push(orbit);
        } else {
            for frame in frames {
                partition.incomplete.entry(frame).or_default().push(orbit);
            }
        }
    }
    partition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oaf(s: &str) -> OrbitFrame {
        s.parse().unwrap()
    }

    fn letters(frames: &[Frame]) -> String {
        frames.iter().map(|f| f.letter()).collect()
    }

    #[test]
    fn test_frame_range() {
        assert_eq!(letters(&frame_range(Frame::A, Frame::D)), "ABCD");
        assert_eq!(letters(&frame_range(Frame::F, Frame::C)), "FGHABC");
        assert_eq!(letters(&frame_range(Frame::E, Frame::E)), "E");
    }

    #[test]
    fn test_parse_orbit_and_frame() {
        assert_eq!(oaf("00981E"), OrbitFrame::new(981, Frame::E));
        assert_eq!(oaf("981e").to_string(), "00981E");
        assert!("E".parse::<OrbitFrame>().is_err());
        assert!("00981X".parse::<OrbitFrame>().is_err());
        assert!("100000A".parse::<OrbitFrame>().is_err());
        assert!("-1A".parse::<OrbitFrame>().is_err());
    }

    #[test]
    fn test_expand_range_across_orbits() {
        let pairs = expand_orbit_and_frame_range(oaf("00010F"), oaf("00012C")).unwrap();
        assert_eq!(pairs.len(), 14);
        let frames_of = |orbit| {
            pairs
                .iter()
                .filter(|p| p.orbit == orbit)
                .map(|p| p.frame.letter())
                .collect::<String>()
        };
        assert_eq!(frames_of(10), "FGH");
        assert_eq!(frames_of(11), "ABCDEFGH");
        assert_eq!(frames_of(12), "ABC");
    }

    #[test]
    fn test_expand_range_same_orbit_and_adjacent() {
        let pairs = expand_orbit_and_frame_range(oaf("00010B"), oaf("00010D")).unwrap();
        assert_eq!(pairs.len(), 3);
        let pairs = expand_orbit_and_frame_range(oaf("00010G"), oaf("00011A")).unwrap();
        assert_eq!(
            pairs,
            vec![oaf("00010G"), oaf("00010H"), oaf("00011A")]
        );
        assert!(expand_orbit_and_frame_range(oaf("00012A"), oaf("00010A")).is_err());
    }

    #[test]
    fn test_combine_rejects_range_with_separate_selectors() {
        let range = Some((oaf("00010F"), oaf("00012C")));
        let err = combine_orbit_frame_inputs(&[5], &[], &[], range).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = combine_orbit_frame_inputs(&[], &[Frame::A], &[], range).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_combine_range_with_tokens_and_dedup() {
        let pairs = combine_orbit_frame_inputs(
            &[],
            &[],
            &[oaf("00010G"), oaf("00020A")],
            Some((oaf("00010F"), oaf("00010H"))),
        )
        .unwrap();
        assert_eq!(pairs, vec![oaf("00010F"), oaf("00010G"), oaf("00010H"), oaf("00020A")]);
    }

    #[test]
    fn test_combine_cross_product() {
        let pairs = combine_orbit_frame_inputs(&[1, 2], &[Frame::B, Frame::C], &[], None).unwrap();
        assert_eq!(pairs.len(), 4);
        let pairs = combine_orbit_frame_inputs(&[7], &[], &[], None).unwrap();
        assert_eq!(pairs.len(), 8);
    }

    #[test]
    fn test_partition() {
        let pairs = expand_orbit_and_frame_range(oaf("00010F"), oaf("00012C")).unwrap();
        let partition = partition_complete_incomplete(&pairs);
        assert_eq!(partition.complete, vec![11]);
        assert_eq!(partition.incomplete[&Frame::F], vec![10]);
        assert_eq!(partition.incomplete[&Frame::A], vec![12]);
        assert_eq!(partition.incomplete[&Frame::C], vec![12]);
        assert!(!partition.incomplete.contains_key(&Frame::D));

        // every input pair lands in exactly one partition
        let covered: usize = partition.complete.len() * 8
            + partition.incomplete.values().map(Vec::len).sum::<usize>();
        assert_eq!(covered, pairs.len());
        for orbits in partition.incomplete.values() {
            assert!(orbits.iter().all(|o| !partition.complete.contains(o)));
        }
    }
}
