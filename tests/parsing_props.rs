//! Property tests for identifier, resolution and tool-output parsing

use crabstream::platform::v4l2_ctl::{parse_device_list, parse_discrete_sizes};
use crabstream::{DeviceId, Resolution};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_numeric_ids_are_indices(index in 0u32..10_000) {
        let id: DeviceId = index.to_string().parse().unwrap();
        prop_assert_eq!(id.index(), Some(index));
        prop_assert_eq!(id.device_path(), format!("/dev/video{}", index));
    }

    #[test]
    fn prop_video_paths_resolve_to_index(index in 0u32..10_000) {
        let id: DeviceId = format!("/dev/video{}", index).parse().unwrap();
        prop_assert_eq!(&id, &DeviceId::Path(format!("/dev/video{}", index)));
        prop_assert_eq!(id.index(), Some(index));
    }

    #[test]
    fn prop_resolution_text(width in 1u32..10_000, height in 1u32..10_000) {
        let parsed: Resolution = format!("{}x{}", width, height).parse().unwrap();
        prop_assert_eq!(parsed, Resolution::new(width, height));
        let zero_width = format!("0x{}", height);
        prop_assert!(zero_width.parse::<Resolution>().is_err());
    }

    #[test]
    fn prop_tolerance_is_symmetric_and_monotonic(
        a in (0u32..4000, 0u32..4000),
        b in (0u32..4000, 0u32..4000),
        tolerance in 0u32..500,
    ) {
        let a = Resolution::new(a.0, a.1);
        let b = Resolution::new(b.0, b.1);
        prop_assert_eq!(a.within(&b, tolerance), b.within(&a, tolerance));
        prop_assert!(a.within(&a, 0));
        if a.within(&b, tolerance) {
            prop_assert!(a.within(&b, tolerance + 1));
        }
    }

    #[test]
    fn prop_discrete_sizes_are_unique(
        sizes in prop::collection::vec((1u32..4000, 1u32..4000), 0..40),
    ) {
        let listing: String = sizes
            .iter()
            .map(|(w, h)| format!("\t\tSize: Discrete {}x{}\n", w, h))
            .collect();
        let parsed = parse_discrete_sizes(&listing);

        let unique: HashSet<_> = parsed.iter().collect();
        prop_assert_eq!(unique.len(), parsed.len());
        let expected: HashSet<_> = sizes.iter().map(|&(w, h)| Resolution::new(w, h)).collect();
        prop_assert_eq!(parsed.len(), expected.len());
    }

    #[test]
    fn prop_device_list_pairs_paths_with_cards(
        cards in prop::collection::vec(
            (
                "[A-Z][a-z]{0,6}( [A-Z][a-z]{0,6}){0,2}".prop_filter("no dev", |s| !s.contains("dev")),
                prop::collection::vec(0u32..64, 0..4),
                prop::collection::vec(0u32..8, 0..3),
            ),
            0..6,
        ),
    ) {
        let mut listing = String::new();
        let mut expected = Vec::new();
        for (i, (name, videos, medias)) in cards.iter().enumerate() {
            listing.push_str(&format!("{}: {} (usb-0000:00:14.0-{}):\n", name, name, i + 1));
            for n in videos {
                listing.push_str(&format!("\t/dev/video{}\n", n));
                expected.push((name.clone(), format!("/dev/video{}", n)));
            }
            for m in medias {
                listing.push_str(&format!("\t/dev/media{}\n", m));
            }
            listing.push('\n');
        }

        prop_assert_eq!(parse_device_list(&listing), expected);
    }
}
