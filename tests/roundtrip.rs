//! End-to-end encode/decode tests for zenpik

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zenpik::{Decoder, Encoder, Error};

/// Create a uniform color test image
fn create_uniform_image(width: usize, height: usize, r: u8, g: u8, b: u8) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for _ in 0..(width * height) {
        pixels.push(r);
        pixels.push(g);
        pixels.push(b);
    }
    pixels
}

/// Half black, half white, split vertically at width / 2
fn create_edge_image(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for _ in 0..height {
        for x in 0..width {
            let v = if x < width / 2 { 0u8 } else { 255u8 };
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    pixels
}

/// Linear ramp on all channels along x
fn create_gradient_image(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for _ in 0..height {
        for x in 0..width {
            let v = (x * 255 / (width - 1)) as u8;
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    pixels
}

fn max_channel_error(a: &[u8], b: &[u8]) -> i32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (i32::from(x) - i32::from(y)).abs())
        .max()
        .unwrap_or(0)
}

#[test]
fn test_flat_gray_roundtrip() {
    let (width, height) = (64, 64);
    let pixels = create_uniform_image(width, height, 128, 128, 128);

    let compressed = Encoder::new()
        .distance(1.0)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    // A flat image is DC-only; the stream must be far below raw size.
    assert!(
        compressed.len() < pixels.len() / 8,
        "flat gray should compress strongly, got {} bytes",
        compressed.len()
    );

    let decoded = Decoder::new().decode(&compressed).unwrap();
    assert_eq!(decoded.width, width);
    assert_eq!(decoded.height, height);
    assert!(decoded.alpha.is_none());
    let err = max_channel_error(&pixels, &decoded.pixels);
    assert!(err <= 2, "flat gray error {} exceeds 2 levels", err);
}

#[test]
fn test_sharp_edge_roundtrip() {
    let (width, height) = (128, 128);
    let pixels = create_edge_image(width, height);

    let compressed = Encoder::new()
        .distance(1.0)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    assert!(compressed.len() < pixels.len());

    let decoded = Decoder::new().decode(&compressed).unwrap();
    // Both halves keep their identity.
    let mut dark_sum = 0u64;
    let mut bright_sum = 0u64;
    for y in 0..height {
        for x in 0..width {
            let v = u64::from(decoded.pixels[(y * width + x) * 3]);
            if x < width / 2 - 4 {
                dark_sum += v;
            } else if x >= width / 2 + 4 {
                bright_sum += v;
            }
        }
    }
    let dark_mean = dark_sum / (height as u64 * (width / 2 - 4) as u64);
    let bright_mean = bright_sum / (height as u64 * (width / 2 - 4) as u64);
    assert!(dark_mean < 30, "dark half drifted to {}", dark_mean);
    assert!(bright_mean > 225, "bright half drifted to {}", bright_mean);

    // The transition still happens at the middle, within one block.
    for y in (0..height).step_by(16) {
        let row = &decoded.pixels[y * width * 3..(y + 1) * width * 3];
        let first_bright = (0..width)
            .find(|&x| row[3 * x] > 128)
            .expect("row lost its bright half");
        assert!(
            (first_bright as i32 - (width / 2) as i32).abs() <= 8,
            "edge moved to {} in row {}",
            first_bright,
            y
        );
    }
}

#[test]
fn test_noisy_image_roundtrip() {
    let (width, height) = (128, 128);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut pixels = Vec::with_capacity(width * height * 3);
    for _ in 0..(width * height) {
        let base = 110u8;
        for _ in 0..3 {
            pixels.push(base + rng.gen_range(0..8));
        }
    }

    let compressed = Encoder::new()
        .distance(2.0)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    assert!(
        compressed.len() < pixels.len(),
        "noisy image must still beat raw, got {} of {}",
        compressed.len(),
        pixels.len()
    );

    let decoded = Decoder::new().decode(&compressed).unwrap();
    // Grain synthesis keeps local variance in the same ballpark as the
    // input instead of flattening it.
    let variance = |data: &[u8]| {
        let lum: Vec<f64> = data.chunks_exact(3).map(|c| f64::from(c[0])).collect();
        let mean = lum.iter().sum::<f64>() / lum.len() as f64;
        lum.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / lum.len() as f64
    };
    let var_in = variance(&pixels);
    let var_out = variance(&decoded.pixels);
    assert!(
        var_out > 0.1 * var_in && var_out < 10.0 * var_in,
        "variance {} vs input {}",
        var_out,
        var_in
    );
}

#[test]
fn test_gradient_roundtrip() {
    let (width, height) = (128, 16);
    let pixels = create_gradient_image(width, height);

    let compressed = Encoder::new()
        .distance(0.8)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    let decoded = Decoder::new().decode(&compressed).unwrap();

    // The ramp survives: row means increase monotonically across blocks.
    let row = 8;
    let mut prev = 0u32;
    for bx in 0..width / 8 {
        let mut mean = 0u32;
        for dx in 0..8 {
            mean += u32::from(decoded.pixels[(row * width + bx * 8 + dx) * 3]);
        }
        mean /= 8;
        assert!(
            mean + 4 >= prev,
            "ramp broke at block {}: {} after {}",
            bx,
            mean,
            prev
        );
        prev = mean;
    }
    let err = max_channel_error(&pixels, &decoded.pixels);
    assert!(err <= 24, "gradient error {}", err);
}

#[test]
fn test_alpha_roundtrip_bit_exact() {
    let (width, height) = (32, 32);
    let mut rng = StdRng::seed_from_u64(99);
    let mut pixels = Vec::with_capacity(width * height * 4);
    for _ in 0..(width * height) {
        pixels.push(rng.gen_range(40..200));
        pixels.push(rng.gen_range(40..200));
        pixels.push(rng.gen_range(40..200));
        pixels.push(rng.gen());
    }

    let compressed = Encoder::new()
        .distance(1.5)
        .encode_rgba(&pixels, width, height)
        .unwrap();
    let decoded = Decoder::new().decode(&compressed).unwrap();
    let alpha = decoded.alpha.expect("alpha flag must be set");
    for i in 0..width * height {
        assert_eq!(
            alpha[i],
            pixels[4 * i + 3],
            "alpha mismatch at pixel {}",
            i
        );
    }
}

#[test]
fn test_empty_image_is_invalid_input() {
    let err = Encoder::new().encode_rgb(&[], 0, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidDimensions { .. }));
}

#[test]
fn test_target_size_fast_mode() {
    let (width, height) = (64, 64);
    let mut rng = StdRng::seed_from_u64(7);
    let mut pixels = Vec::with_capacity(width * height * 3);
    for _ in 0..(width * height * 3) {
        pixels.push(rng.gen_range(60..190));
    }

    let target = 4000;
    let compressed = Encoder::new()
        .target_size(target)
        .target_size_search_fast_mode(true)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    assert!(
        compressed.len() <= target,
        "{} bytes exceeds target {}",
        compressed.len(),
        target
    );
    // Whatever fits must still decode.
    let decoded = Decoder::new().decode(&compressed).unwrap();
    assert_eq!(decoded.width, width);
}

#[test]
fn test_fast_mode_roundtrip() {
    let (width, height) = (48, 48);
    let pixels = create_gradient_image(width, height);
    let compressed = Encoder::new()
        .distance(2.5)
        .fast_mode(true)
        .encode_rgb(&pixels, width, height)
        .unwrap();
    let decoded = Decoder::new().decode(&compressed).unwrap();
    let err = max_channel_error(&pixels, &decoded.pixels);
    assert!(err <= 48, "fast mode error {}", err);
}

#[test]
fn test_non_block_aligned_sizes() {
    for (width, height) in [(13, 9), (17, 32), (31, 7)] {
        let pixels = create_gradient_image(width, height);
        let compressed = Encoder::new()
            .distance(1.5)
            .fast_mode(true)
            .encode_rgb(&pixels, width, height)
            .unwrap();
        let decoded = Decoder::new().decode(&compressed).unwrap();
        assert_eq!(decoded.width, width, "{}x{}", width, height);
        assert_eq!(decoded.height, height);
        assert_eq!(decoded.pixels.len(), width * height * 3);
    }
}

#[test]
fn test_truncated_stream_errors_cleanly() {
    let pixels = create_uniform_image(32, 32, 90, 120, 150);
    let compressed = Encoder::new()
        .distance(1.0)
        .encode_rgb(&pixels, 32, 32)
        .unwrap();
    for len in [0, 5, 14, compressed.len() / 2, compressed.len() - 1] {
        let result = Decoder::new().decode(&compressed[..len]);
        assert!(result.is_err(), "truncation to {} bytes must fail", len);
    }
}

#[test]
fn test_check_decompressed_size() {
    let pixels = create_uniform_image(16, 16, 10, 20, 30);
    let mut compressed = Encoder::new()
        .distance(1.0)
        .encode_rgb(&pixels, 16, 16)
        .unwrap();
    assert!(Decoder::new()
        .check_decompressed_size(true)
        .decode(&compressed)
        .is_ok());
    compressed.extend_from_slice(&[0, 0, 0]);
    assert!(Decoder::new()
        .check_decompressed_size(true)
        .decode(&compressed)
        .is_err());
    // Without the check, trailing bytes are tolerated.
    assert!(Decoder::new().decode(&compressed).is_ok());
}
