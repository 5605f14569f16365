use anyhow::Error;
use opencv::core::{flip, rotate, Mat, MatTrait, MatTraitConst, Scalar, Vec3b, Vector, CV_8UC3,
                   ROTATE_180, ROTATE_90_CLOCKWISE, ROTATE_90_COUNTERCLOCKWISE};
use opencv::imgcodecs::{imdecode, IMREAD_COLOR};
use opencv::imgproc::{cvt_color, COLOR_BGR2RGB};

/// decode_image decodes an encoded image (JPEG, PNG, ...) into a BGR matrix.
pub fn decode_image(im_bytes: &[u8]) -> Result<Mat, Error> {
    if im_bytes.is_empty() {
        return Err(Error::msg("image buffer is empty"))
    }
    let buf = Vector::<u8>::from_slice(im_bytes);
    let img = imdecode(&buf, IMREAD_COLOR)?;
    if img.empty() {
        return Err(Error::msg("cannot decode image buffer"))
    }
    Ok(img)
}

pub fn bgr_to_rgb(img: &Mat) -> Result<Mat, Error> {
    let mut rgb = Mat::default();
    cvt_color(img, &mut rgb, COLOR_BGR2RGB, 0)?;
    Ok(rgb)
}

/// mirror flips the frame around the vertical axis.
pub fn mirror(img: &Mat) -> Result<Mat, Error> {
    let mut flipped = Mat::default();
    flip(img, &mut flipped, 1)?;
    Ok(flipped)
}

/// rotate_frame rotates the frame clockwise by a multiple of 90 degrees.
pub fn rotate_frame(img: Mat, rotation_degrees: i32) -> Result<Mat, Error> {
    let code = match rotation_degrees.rem_euclid(360) {
        0 => return Ok(img),
        90 => ROTATE_90_CLOCKWISE,
        180 => ROTATE_180,
        270 => ROTATE_90_COUNTERCLOCKWISE,
        _ => return Err(Error::msg(format!("unsupported rotation of {rotation_degrees} degrees"))),
    };
    let mut rotated = Mat::default();
    rotate(&img, &mut rotated, code)?;
    Ok(rotated)
}

/// rgba_to_rgb copies an RGBA_8888 buffer into an RGB matrix.
///
/// `row_stride` is the number of bytes per row in `buf`; anything past
/// `4 * width` bytes in a row is padding and is dropped.
pub fn rgba_to_rgb(buf: &[u8], width: i32, height: i32, row_stride: usize) -> Result<Mat, Error> {
    if width <= 0 || height <= 0 {
        return Err(Error::msg(format!("invalid frame size {width}x{height}")))
    }
    let (w, h) = (width as usize, height as usize);
    if row_stride < w * 4 {
        return Err(Error::msg(format!("row stride {row_stride} is smaller than {} bytes", w * 4)))
    }
    let needed = row_stride
        .checked_mul(h - 1)
        .and_then(|n| n.checked_add(w * 4))
        .ok_or_else(|| Error::msg(format!("row stride {row_stride} overflows the frame size")))?;
    if buf.len() < needed {
        return Err(Error::msg(format!("frame buffer has {} bytes, need {needed}", buf.len())))
    }

    let mut rgb = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
    for y in 0..h {
        let row = &buf[y * row_stride..y * row_stride + w * 4];
        for (x, px) in row.chunks_exact(4).enumerate() {
            let dst = rgb.at_2d_mut::<Vec3b>(y as i32, x as i32)?;
            dst[0] = px[0];
            dst[1] = px[1];
            dst[2] = px[2];
        }
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use opencv::core::{Mat, MatTraitConst, Scalar, Vec3b, CV_8UC3};
    use crate::utils::image::{bgr_to_rgb, decode_image, mirror, rgba_to_rgb, rotate_frame};

    fn rgba_frame(width: usize, height: usize, row_stride: usize) -> Vec<u8> {
        let mut buf = vec![0xEEu8; row_stride * height];
        for y in 0..height {
            for x in 0..width {
                let o = y * row_stride + x * 4;
                buf[o] = x as u8;
                buf[o + 1] = y as u8;
                buf[o + 2] = 7;
                buf[o + 3] = 255;
            }
        }
        buf
    }

    #[test]
    fn test_rgba_to_rgb_drops_row_padding() {
        let buf = rgba_frame(3, 2, 16);
        let rgb = rgba_to_rgb(&buf, 3, 2, 16).unwrap();

        assert_eq!(rgb.rows(), 2);
        assert_eq!(rgb.cols(), 3);
        let px = rgb.at_2d::<Vec3b>(1, 2).unwrap();
        assert_eq!((px[0], px[1], px[2]), (2, 1, 7));
    }

    #[test]
    fn test_rgba_to_rgb_rejects_short_buffer() {
        let buf = rgba_frame(3, 2, 12);
        assert!(rgba_to_rgb(&buf[..20], 3, 2, 12).is_err());
        assert!(rgba_to_rgb(&buf, 3, 2, 8).is_err());
    }

    #[test]
    fn test_rgba_to_rgb_rejects_overflowing_stride() {
        let buf = rgba_frame(3, 2, 12);
        assert!(rgba_to_rgb(&buf, 3, 3, usize::MAX).is_err());
        assert!(rgba_to_rgb(&buf, 3, 2, usize::MAX - 4).is_err());
    }

    #[test]
    fn test_rotate_frame_swaps_dimensions() {
        let img = Mat::new_rows_cols_with_default(2, 4, CV_8UC3, Scalar::all(0.0)).unwrap();
        let rotated = rotate_frame(img.clone(), 90).unwrap();
        assert_eq!((rotated.rows(), rotated.cols()), (4, 2));

        let same = rotate_frame(img.clone(), 0).unwrap();
        assert_eq!((same.rows(), same.cols()), (2, 4));

        assert!(rotate_frame(img, 45).is_err());
    }

    #[test]
    fn test_mirror_and_color_swap() {
        let buf = rgba_frame(3, 1, 12);
        let rgb = rgba_to_rgb(&buf, 3, 1, 12).unwrap();

        let flipped = mirror(&rgb).unwrap();
        assert_eq!(flipped.at_2d::<Vec3b>(0, 0).unwrap()[0], 2);

        let swapped = bgr_to_rgb(&rgb).unwrap();
        let px = swapped.at_2d::<Vec3b>(0, 1).unwrap();
        assert_eq!((px[0], px[2]), (7, 1));
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        assert!(decode_image(&[]).is_err());
        assert!(decode_image(&[1, 2, 3, 4]).is_err());
    }
}
