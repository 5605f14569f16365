use std::future::Future;
use anyhow::Error;
use opencv::core::Mat;
use crate::utils::coordinate::HandLandmarks;

/// Source of hand landmarks for a single RGB frame.
///
/// The frame is passed by value so implementations can finish any work that
/// touches it before the returned future first suspends.
pub trait HandLandmarkDetector: Send + Sync {
    fn detect(&self, rgb: Mat) -> impl Future<Output = Result<Vec<HandLandmarks>, Error>> + Send;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use anyhow::Error;
    use opencv::core::{Mat, MatTraitConst};
    use crate::modules::detector::HandLandmarkDetector;
    use crate::utils::coordinate::HandLandmarks;

    /// Returns the same hands for every frame and records the width of each frame it saw.
    #[derive(Clone, Default)]
    pub(crate) struct StaticDetector {
        pub hands: Vec<HandLandmarks>,
        pub fail: bool,
        pub seen_widths: Arc<Mutex<Vec<i32>>>,
    }

    impl StaticDetector {
        pub fn with_hands(hands: Vec<HandLandmarks>) -> Self {
            StaticDetector { hands, ..Default::default() }
        }

        pub fn failing() -> Self {
            StaticDetector { fail: true, ..Default::default() }
        }
    }

    impl HandLandmarkDetector for StaticDetector {
        fn detect(&self, rgb: Mat) -> impl Future<Output = Result<Vec<HandLandmarks>, Error>> + Send {
            self.seen_widths.lock().unwrap().push(rgb.cols());
            let result = if self.fail {
                Err(Error::msg("model unavailable"))
            } else {
                Ok(self.hands.clone())
            };
            async move { result }
        }
    }
}
