use ndarray::{Array2, ArrayView2, Zip};

/// 2-D convolution with zero padding, output the same shape as `input`.
///
/// The kernel is anchored at `(rows / 2, cols / 2)` and flipped, i.e. this is
/// the mathematical convolution, not a correlation. Samples outside `input`
/// contribute zero, so edge pixels see only the part of the kernel that
/// overlaps the image.
pub fn convolve2d(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Array2<f64> {
    let (height, width) = input.dim();
    let (kh, kw) = kernel.dim();
    let (ay, ax) = ((kh / 2) as isize, (kw / 2) as isize);

    let mut output = Array2::<f64>::zeros((height, width));
    if kh == 0 || kw == 0 {
        return output;
    }

    Zip::indexed(&mut output).par_for_each(|(r, c), out| {
        let mut acc = 0.0;
        for i in 0..kh {
            let sy = r as isize + ay - i as isize;
            if sy < 0 || sy >= height as isize {
                continue;
            }
            for j in 0..kw {
                let sx = c as isize + ax - j as isize;
                if sx < 0 || sx >= width as isize {
                    continue;
                }
                acc += kernel[[i, j]] * input[[sy as usize, sx as usize]];
            }
        }
        *out = acc;
    });

    output
}
