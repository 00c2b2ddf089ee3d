// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::constants::PI;

#[test]
fn test_cexp() {
    let c = cexp(PI);
    assert_abs_diff_eq!(c.re, -1.0, epsilon = 1e-15);
    assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-15);
}

#[test]
fn test_is_composite_235() {
    assert!(!is_composite_235(0));
    assert!(is_composite_235(1));
    assert!(is_composite_235(2));
    assert!(is_composite_235(60));
    assert!(is_composite_235(1000));
    assert!(!is_composite_235(7));
    assert!(!is_composite_235(22));
}

#[test]
fn test_padded_size_invariants() {
    for image_size in [1, 17, 64, 100] {
        for padding in [1.0, 1.2, 2.0] {
            let p = padded_size(image_size, padding);
            assert_eq!(p % 2, 0, "size {image_size}, padding {padding}");
            assert!(
                p as f64 + 1e-9 >= padding * image_size as f64,
                "size {image_size}, padding {padding}: {p}"
            );
            assert!(p >= image_size);
            assert!(is_composite_235(p));
        }
    }
}

#[test]
fn test_padded_size_values() {
    assert_eq!(padded_size(64, 1.0), 64);
    assert_eq!(padded_size(100, 1.2), 120);
    assert_eq!(padded_size(17, 1.0), 18);
    assert_eq!(padded_size(17, 2.0), 36);
    assert_eq!(padded_size(1, 1.0), 2);
    // 1.2 * 64 = 76.8 -> 77 -> 78 (2*3*13) isn't composite; 80 is.
    assert_eq!(padded_size(64, 1.2), 80);
}

#[test]
fn test_centred_offset() {
    assert_eq!(centred_offset(80, 64), 8);
    assert_eq!(centred_offset(64, 64), 0);
    assert_eq!(centred_offset(18, 17), 0);
}

#[test]
fn test_baseline_number_groups_pairs() {
    assert_eq!(baseline_number(4, 0, 1), 1);
    assert_eq!(baseline_number(4, 1, 0), 4);
    assert_eq!(baseline_number(4, 2, 3), 11);
}
