use std::ops::Range;

/// ITU-R BT.601 luma with integer weights.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Source pixels covered by `cell` when `pixels` are split into `cells`.
///
/// Blocks are `pixels / cells` wide and the last block runs to the edge, so
/// a remainder is absorbed by the final row or column. When there are fewer
/// pixels than cells each cell samples its nearest pixel.
pub fn block_span(cell: usize, cells: usize, pixels: usize) -> Range<usize> {
    debug_assert!(cell < cells && pixels > 0);

    if pixels < cells {
        let x = cell * pixels / cells;
        return x..x + 1;
    }

    let block = pixels / cells;
    let start = cell * block;
    let end = if cell + 1 == cells { pixels } else { start + block };
    start..end
}

/// Mean luma of an RGB8 block.
pub fn block_luminance(data: &[u8], stride: usize, xs: Range<usize>, ys: Range<usize>) -> u8 {
    let mut sum: u64 = 0;
    let mut count: u64 = 0;

    for y in ys {
        let row = &data[y * stride..];
        for x in xs.clone() {
            let px = &row[x * 3..x * 3 + 3];
            sum += luminance(px[0], px[1], px[2]) as u64;
            count += 1;
        }
    }

    if count == 0 { 0 } else { (sum / count) as u8 }
}
