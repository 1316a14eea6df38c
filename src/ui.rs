// UI shell collaborator — pure notifications, nothing returned to the core.

pub trait UiShell: Send + Sync {
    fn show_navigation(&self, _file_id: &str, _collection: &[String]) {}

    fn show_loading_indicator(&self) {}

    fn hide_loading_indicator(&self) {}

    fn start_progress(&self) {}

    fn finish_progress(&self) {}
}

/// Shell used when the host supplies none.
pub struct NoopUi;

impl UiShell for NoopUi {}
