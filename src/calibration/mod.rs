//! Probability calibration for estimators that only produce scores

mod platt;

pub use platt::PlattScaling;
