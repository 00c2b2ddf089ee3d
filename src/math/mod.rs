// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.

#[cfg(test)]
mod tests;

use marlu::c64;

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// Is the supplied number a product of only 2, 3 and 5? These are the sizes
/// FFTs are most efficient with.
pub(crate) fn is_composite_235(mut n: usize) -> bool {
    if n == 0 {
        return false;
    }
    for factor in [2, 3, 5] {
        while n % factor == 0 {
            n /= factor;
        }
    }
    n == 1
}

/// Get the padded size of an image axis: the smallest even number that is a
/// product of only 2, 3 and 5, and at least `padding * image_size`.
pub(crate) fn padded_size(image_size: usize, padding: f64) -> usize {
    // The small tolerance stops float noise in the product bumping the size.
    let target = (padding * image_size as f64 - 1e-9).ceil().max(1.0) as usize;
    let mut n = target + target % 2;
    while !is_composite_235(n) {
        n += 2;
    }
    n
}

/// The offset of an image axis centred inside a padded axis.
#[inline]
pub(crate) fn centred_offset(padded_size: usize, image_size: usize) -> usize {
    (padded_size - image_size) / 2
}

/// Identify a baseline by its antennas.
#[inline]
pub(crate) fn baseline_number(num_antennas: usize, ant1: usize, ant2: usize) -> usize {
    num_antennas * ant1 + ant2
}

/// The resident memory of this process in kibibytes, if it's available. This
/// is only used to make out-of-memory diagnostics more useful.
pub(crate) fn resident_memory_kib() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}
