use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where frames come from: a camera index or a video file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Camera(u32),
    File(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = std::convert::Infallible;

    /// A bare non-negative integer selects a camera; anything else is a path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<u32>() {
            Ok(index) => SourceSpec::Camera(index),
            Err(_) => SourceSpec::File(PathBuf::from(trimmed)),
        })
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Camera(index) => write!(f, "camera {index}"),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}
