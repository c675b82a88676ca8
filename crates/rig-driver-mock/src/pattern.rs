//! Synthetic frames and spectra for the simulated instruments.

/// glibc-style LCG for reproducible per-pixel noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// 16-bit test frame: diagonal gradient plus a Gaussian hotspot that orbits
/// the centre with the frame number, over low-amplitude noise.
///
/// Every pixel is at least 1, so a generated frame is never all black.
pub fn test_frame(width: u32, height: u32, frame_num: u64) -> Vec<u16> {
    let w = width as usize;
    let h = height as usize;
    let mut buffer = vec![0u16; w * h];
    if w == 0 || h == 0 {
        return buffer;
    }

    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;
    let orbit = (w.min(h) as f64) / 4.0;
    let angle = (frame_num as f64 * 0.05) % (2.0 * std::f64::consts::PI);
    let hx = cx + orbit * angle.cos();
    let hy = cy + orbit * angle.sin();
    let sigma = (w.min(h) as f64 / 8.0).max(1.0);
    let frame_seed = frame_num.wrapping_mul(2654435761);

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let gradient = ((x + y) * 32767 / (w + h).max(1)) as f64;
            let dx = x as f64 - hx;
            let dy = y as f64 - hy;
            let hotspot = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp() * 30000.0;
            let noise = (prng(frame_seed ^ idx as u64) & 0x3FF) as f64;
            buffer[idx] = (gradient + hotspot + noise).clamp(1.0, 65535.0) as u16;
        }
    }
    buffer
}

/// Downscale a 16-bit frame to 8 bits, keeping lit pixels non-zero.
pub fn to_mono8(frame: &[u16]) -> Vec<u8> {
    frame
        .iter()
        .map(|&v| if v == 0 { 0 } else { ((v >> 8) as u8).max(1) })
        .collect()
}

/// Emission-line spectrum: a Gaussian peak at `peak_nm` on a flat baseline,
/// scaled by integration time.
pub fn emission_spectrum(
    wavelengths: &[f64],
    peak_nm: f64,
    integration_ms: f64,
    baseline: f64,
    mut noise: impl FnMut() -> f64,
) -> Vec<f64> {
    let scale = (integration_ms / 10.0).clamp(0.01, 6000.0);
    wavelengths
        .iter()
        .map(|&nm| {
            let d = (nm - peak_nm) / 5.0;
            let peak = 1000.0 * (-0.5 * d * d).exp();
            (baseline + peak * scale + noise()).max(0.0)
        })
        .collect()
}

/// Evenly spaced wavelength axis.
pub fn wavelength_axis(pixels: usize, start_nm: f64, end_nm: f64) -> Vec<f64> {
    match pixels {
        0 => Vec::new(),
        1 => vec![start_nm],
        n => {
            let step = (end_nm - start_nm) / (n - 1) as f64;
            (0..n).map(|i| start_nm + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_requested_size_and_no_black_pixels() {
        let frame = test_frame(40, 30, 0);
        assert_eq!(frame.len(), 40 * 30);
        assert!(frame.iter().all(|&v| v > 0));
    }

    #[test]
    fn frame_changes_with_frame_number() {
        assert_ne!(test_frame(32, 32, 0), test_frame(32, 32, 1));
    }

    #[test]
    fn mono8_keeps_lit_pixels_lit() {
        assert_eq!(to_mono8(&[0, 1, 256, 65535]), vec![0, 1, 1, 255]);
    }

    #[test]
    fn spectrum_peaks_at_line() {
        let axis = wavelength_axis(101, 600.0, 700.0);
        let spectrum = emission_spectrum(&axis, 650.0, 100.0, 10.0, || 0.0);
        let (argmax, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(axis[argmax], 650.0);
    }

    #[test]
    fn axis_endpoints() {
        let axis = wavelength_axis(3, 200.0, 1000.0);
        assert_eq!(axis, vec![200.0, 600.0, 1000.0]);
        assert!(wavelength_axis(0, 0.0, 1.0).is_empty());
    }
}
