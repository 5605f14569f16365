pub mod detector;
pub mod hand_landmark_client;
pub mod sign_classifier;
