//! Palette collaborator: dominant colors by k-means over 16-bit RGB pixels.

use anyhow::{Result, bail};
use image::DynamicImage;
use rayon::prelude::*;

/// One palette entry: centroid color (16-bit channels) and how many pixels it won.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteColor {
    pub rgb: [u16; 3],
    pub weight: usize,
}

/// Up to `k` dominant colors of `img`, heaviest first.
///
/// Deterministic: initial centroids are spread evenly over the sorted distinct colors, and `k`
/// is clamped to the number of distinct colors. Stops when assignments stop changing or after
/// `max_iterations` rounds.
pub fn extract_palette(
    img: &DynamicImage,
    k: usize,
    max_iterations: usize,
) -> Result<Vec<PaletteColor>> {
    if k == 0 {
        bail!("palette size must be at least 1");
    }
    if max_iterations == 0 {
        bail!("palette needs at least one iteration");
    }
    let rgb = img.to_rgb16();
    let pixels: Vec<[f64; 3]> = rgb
        .pixels()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect();
    if pixels.is_empty() {
        bail!("cannot extract a palette from an empty image");
    }

    let mut distinct: Vec<[u16; 3]> = rgb.pixels().map(|p| p.0).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let k = k.min(distinct.len());
    let mut centroids: Vec<[f64; 3]> = (0..k)
        .map(|i| distinct[i * distinct.len() / k].map(f64::from))
        .collect();

    let mut assignment: Vec<usize> = Vec::new();
    let mut counts = vec![0_usize; k];
    for _ in 0..max_iterations {
        let next: Vec<usize> = pixels.par_iter().map(|p| nearest(&centroids, p)).collect();
        let settled = next == assignment;
        assignment = next;
        if settled {
            break;
        }

        let mut sums = vec![[0.0_f64; 3]; k];
        counts = vec![0; k];
        for (p, &c) in pixels.iter().zip(&assignment) {
            for ch in 0..3 {
                sums[c][ch] += p[ch];
            }
            counts[c] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                let n = counts[c] as f64;
                centroids[c] = [sums[c][0] / n, sums[c][1] / n, sums[c][2] / n];
            }
        }
    }

    let mut palette: Vec<PaletteColor> = centroids
        .iter()
        .zip(&counts)
        .filter(|&(_, &n)| n > 0)
        .map(|(c, &n)| PaletteColor {
            rgb: (*c).map(|v| v.round().clamp(0.0, f64::from(u16::MAX)) as u16),
            weight: n,
        })
        .collect();
    palette.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.rgb.cmp(&b.rgb)));
    Ok(palette)
}

fn nearest(centroids: &[[f64; 3]], p: &[f64; 3]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = (c[0] - p[0]).powi(2) + (c[1] - p[1]).powi(2) + (c[2] - p[2]).powi(2);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Scale a 16-bit channel to 8 bits.
pub fn normalize(v: u16) -> u8 {
    (u32::from(v) * 255 / 65535) as u8
}

/// `rrggbb`, two lowercase hex digits per channel.
pub fn to_hex(rgb: [u16; 3]) -> String {
    format!(
        "{:02x}{:02x}{:02x}",
        normalize(rgb[0]),
        normalize(rgb[1]),
        normalize(rgb[2])
    )
}
