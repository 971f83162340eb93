use tracing::debug;

pub type ProgressCallback = Box<dyn Fn(u8, &str) + Send + Sync>;

/// Reports coarse import milestones as (percent, message).
pub struct Progress {
    callback: Option<ProgressCallback>,
}

impl Progress {
    pub fn new(callback: ProgressCallback) -> Self {
        Self { callback: Some(callback) }
    }

    pub fn none() -> Self {
        Self { callback: None }
    }

    pub fn report(&self, percent: u8, message: &str) {
        let percent = percent.min(100);
        debug!("[{:>3}%] {}", percent, message);
        if let Some(callback) = &self.callback {
            callback(percent, message);
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}
