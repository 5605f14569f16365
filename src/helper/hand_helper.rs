use anyhow::Error;
use ndarray::{Array3, Array4, Axis};
use opencv::core::{Mat, MatTraitConst, Point, Rect, Scalar, Size, Vec3b, CV_8UC3};
use opencv::imgproc::{circle, put_text, resize, FILLED, FONT_HERSHEY_SIMPLEX, INTER_LINEAR, LINE_8};
use crate::config::config::TensorLayout;
use crate::utils::coordinate::{hand_index, Landmark3D, NUM_HAND_LANDMARKS};

const FINGER_TIPS: [usize; 5] = [
    hand_index::THUMB_TIP,
    hand_index::INDEX_TIP,
    hand_index::MIDDLE_TIP,
    hand_index::RING_TIP,
    hand_index::PINKY_TIP,
];

const FINGER_JOINTS: [usize; 5] = [
    hand_index::THUMB_MCP,
    hand_index::INDEX_PIP,
    hand_index::MIDDLE_PIP,
    hand_index::RING_PIP,
    hand_index::PINKY_PIP,
];

/// fingers_extended reports, for thumb, index, middle, ring and pinky, whether
/// the fingertip sits above its joint in the image.
///
/// # Arguments
/// * `landmarks` - 21 frame-normalized hand landmarks
///
/// # Returns
/// * `[bool; 5]`
pub fn fingers_extended(landmarks: &[Landmark3D]) -> Result<[bool; 5], Error> {
    if landmarks.len() != NUM_HAND_LANDMARKS {
        return Err(Error::msg(format!("expected {NUM_HAND_LANDMARKS} landmarks, got {}", landmarks.len())))
    }
    let mut extended = [false; 5];
    for (i, (&tip, &joint)) in FINGER_TIPS.iter().zip(FINGER_JOINTS.iter()).enumerate() {
        extended[i] = landmarks[tip].y < landmarks[joint].y;
    }
    Ok(extended)
}

pub fn count_extended(extended: &[bool; 5]) -> usize {
    extended.iter().filter(|&&e| e).count()
}

/// mean_y is the mean vertical position of the hand.
pub fn mean_y(landmarks: &[Landmark3D]) -> f32 {
    if landmarks.is_empty() {
        return 0.0
    }
    landmarks.iter().map(|l| l.y).sum::<f32>() / landmarks.len() as f32
}

/// Placement of a frame inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: i32,
    pub new_width: i32,
    pub new_height: i32,
}

impl Letterbox {
    /// fit computes the aspect-preserving size of a `width`x`height` frame inside
    /// an `input_size` square, anchored at the top-left corner.
    pub fn fit(width: i32, height: i32, input_size: i32) -> Result<Self, Error> {
        if width <= 0 || height <= 0 || input_size <= 0 {
            return Err(Error::msg(format!("cannot letterbox a {width}x{height} frame into {input_size}")))
        }
        let (new_width, new_height) = if width >= height {
            let new_height = ((input_size as f32 * height as f32 / width as f32) as i32).max(1);
            (input_size, new_height)
        } else {
            let new_width = ((input_size as f32 * width as f32 / height as f32) as i32).max(1);
            (new_width, input_size)
        };
        Ok(Letterbox { input_size, new_width, new_height })
    }

    /// unproject maps a landmark in model input pixels back to frame-normalized coordinates.
    pub fn unproject(&self, x: f32, y: f32, z: f32) -> Landmark3D {
        Landmark3D {
            x: x / self.new_width as f32,
            y: y / self.new_height as f32,
            z: z / self.new_width as f32,
        }
    }
}

/// letterbox resizes an RGB frame into the square model input with zero padding
/// on the right and bottom.
pub fn letterbox(img: &Mat, input_size: i32) -> Result<(Mat, Letterbox), Error> {
    let lb = Letterbox::fit(img.cols(), img.rows(), input_size)?;

    let mut img_resized = Mat::default();
    resize(
        img,
        &mut img_resized,
        Size::new(lb.new_width, lb.new_height),
        0.0,
        0.0,
        INTER_LINEAR,
    )?;

    let mut img_scaled = Mat::new_rows_cols_with_default(
        input_size,
        input_size,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    {
        let mut roi = Mat::roi_mut(&mut img_scaled, Rect::new(0, 0, lb.new_width, lb.new_height))?;
        img_resized.copy_to(&mut roi)?;
    }

    Ok((img_scaled, lb))
}

/// to_input_tensor normalizes an RGB image with `(p - mean) * scale` and adds the batch axis.
pub fn to_input_tensor(img: &Mat, mean: f32, scale: f32, layout: TensorLayout) -> Result<Array4<f32>, Error> {
    let (rows, cols) = (img.rows() as usize, img.cols() as usize);
    let mut im_tensor = Array3::<f32>::zeros((rows, cols, 3));

    for y in 0..rows {
        for x in 0..cols {
            let px = img.at_2d::<Vec3b>(y as i32, x as i32)?;
            for c in 0..3 {
                im_tensor[[y, x, c]] = (px[c] as f32 - mean) * scale;
            }
        }
    }

    let im_tensor = match layout {
        TensorLayout::Nhwc => im_tensor,
        TensorLayout::Nchw => im_tensor.permuted_axes([2, 0, 1]),
    };
    Ok(im_tensor.insert_axis(Axis(0)))
}

/// draw_overlay writes the sign label and confidence on the frame and marks each landmark.
pub fn draw_overlay(frame: &mut Mat, label: &str, confidence: f32, landmarks: &[Landmark3D]) -> Result<(), Error> {
    let (w, h) = (frame.cols() as f32, frame.rows() as f32);
    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);

    for lm in landmarks {
        let center = Point::new((lm.x * w) as i32, (lm.y * h) as i32);
        circle(frame, center, 4, Scalar::new(0.0, 0.0, 255.0, 0.0), FILLED, LINE_8, 0)?;
    }

    let text = format!("Signo: {} ({:.2})", label, confidence);
    put_text(frame, &text, Point::new(10, 30), FONT_HERSHEY_SIMPLEX, 1.0, green, 2, LINE_8, false)?;
    Ok(())
}
