//! Gaborish sharpening pre-filter and its decode-side counterpart
//!
//! The decoder smooths the reconstruction with a small 3x3 kernel; the
//! encoder pre-compensates by convolving the opsin image with an approximate
//! inverse of that kernel, computed once per encode by least squares.

use crate::image::{Image3F, ImageF};

const W1: f32 = 0.110_015_38;
const W2: f32 = 0.089_979_08;

/// The normalized 3x3 smoothing kernel applied at decode time.
#[must_use]
pub fn gaborish_kernel() -> [f32; 9] {
    let norm = 1.0 / (1.0 + 4.0 * (W1 + W2));
    [
        W2 * norm,
        W1 * norm,
        W2 * norm,
        W1 * norm,
        norm,
        W1 * norm,
        W2 * norm,
        W1 * norm,
        W2 * norm,
    ]
}

#[inline]
fn mirror(i: isize, size: usize) -> usize {
    let size = size as isize;
    let mut i = i;
    if i < 0 {
        i = -i - 1;
    }
    if i >= size {
        i = 2 * size - 1 - i;
    }
    i as usize
}

/// Convolves one plane with an odd-sized square kernel, mirroring at borders.
#[must_use]
fn convolve_plane(plane: &ImageF, kernel: &[f32], ksize: usize) -> ImageF {
    debug_assert_eq!(kernel.len(), ksize * ksize);
    let half = (ksize / 2) as isize;
    let (xsize, ysize) = (plane.xsize(), plane.ysize());
    let mut out = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let row_out = out.row_mut(y);
        for x in 0..xsize {
            let mut sum = 0.0f32;
            for ky in 0..ksize {
                let sy = mirror(y as isize + ky as isize - half, ysize);
                let row_in = plane.row(sy);
                for kx in 0..ksize {
                    let sx = mirror(x as isize + kx as isize - half, xsize);
                    sum += kernel[ky * ksize + kx] * row_in[sx];
                }
            }
            row_out[x] = sum;
        }
    }
    out
}

/// Computes a filter whose convolution approximately inverts `filter`.
///
/// Solves the least-squares problem `min || delta - filter * inverse ||^2`
/// over the combined support via the normal equations. Both sizes must be
/// odd. Returns the L2 distance between the identity filter and the
/// composition of the two filters.
pub fn invert_convolution(
    filter: &[f32],
    filter_size: usize,
    inverse: &mut [f32],
    inverse_size: usize,
) -> f32 {
    assert_eq!(filter.len(), filter_size * filter_size);
    assert_eq!(inverse.len(), inverse_size * inverse_size);
    assert!(filter_size % 2 == 1 && inverse_size % 2 == 1);

    let n = inverse_size * inverse_size;
    let fh = (filter_size / 2) as isize;
    let ih = (inverse_size / 2) as isize;

    let f_at = |dy: isize, dx: isize| -> f64 {
        if dy.abs() > fh || dx.abs() > fh {
            0.0
        } else {
            f64::from(filter[((dy + fh) * filter_size as isize + dx + fh) as usize])
        }
    };

    // M[q][q'] is the autocorrelation of the filter at offset q - q';
    // b[q] is the filter evaluated at -q (the correlation with delta).
    let mut m = vec![0.0f64; n * n];
    let mut b = vec![0.0f64; n];
    for qy in -ih..=ih {
        for qx in -ih..=ih {
            let qi = ((qy + ih) * inverse_size as isize + qx + ih) as usize;
            b[qi] = f_at(-qy, -qx);
            for ry in -ih..=ih {
                for rx in -ih..=ih {
                    let ri = ((ry + ih) * inverse_size as isize + rx + ih) as usize;
                    let mut acc = 0.0f64;
                    for py in -(fh + ih)..=(fh + ih) {
                        for px in -(fh + ih)..=(fh + ih) {
                            acc += f_at(py - qy, px - qx) * f_at(py - ry, px - rx);
                        }
                    }
                    m[qi * n + ri] = acc;
                }
            }
        }
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[row * n + col].abs() > m[pivot * n + col].abs() {
                pivot = row;
            }
        }
        if pivot != col {
            for k in 0..n {
                m.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        let diag = m[col * n + col];
        debug_assert!(diag.abs() > 1e-12, "singular normal equations");
        for row in col + 1..n {
            let factor = m[row * n + col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[row * n + k] -= factor * m[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }
    for col in (0..n).rev() {
        let mut acc = b[col];
        for k in col + 1..n {
            acc -= m[col * n + k] * f64::from(inverse[k]);
        }
        inverse[col] = (acc / m[col * n + col]) as f32;
    }

    // Residual of the composition against the identity filter.
    let mut err = 0.0f64;
    let reach = fh + ih;
    for py in -reach..=reach {
        for px in -reach..=reach {
            let mut acc = 0.0f64;
            for qy in -ih..=ih {
                for qx in -ih..=ih {
                    let qi = ((qy + ih) * inverse_size as isize + qx + ih) as usize;
                    acc += f_at(py - qy, px - qx) * f64::from(inverse[qi]);
                }
            }
            let target = if py == 0 && px == 0 { 1.0 } else { 0.0 };
            err += (acc - target) * (acc - target);
        }
    }
    err.sqrt() as f32
}

/// Decoder-side smoothing pass over all planes.
pub fn convolve_gaborish(opsin: &mut Image3F) {
    let kernel = gaborish_kernel();
    for c in 0..3 {
        *opsin.plane_mut(c) = convolve_plane(opsin.plane(c), &kernel, 3);
    }
}

/// Encoder-side sharpening that pre-compensates `convolve_gaborish`.
pub fn gaborish_inverse(opsin: &mut Image3F) {
    let mut inverse = [0.0f32; 25];
    invert_convolution(&gaborish_kernel(), 3, &mut inverse, 5);
    for c in 0..3 {
        *opsin.plane_mut(c) = convolve_plane(opsin.plane(c), &inverse, 5);
    }
}
