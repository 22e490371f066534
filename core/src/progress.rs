use indicatif::{ProgressBar, ProgressStyle};

pub fn default_style() -> ProgressStyle {
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        Ok(style) => style.progress_chars("##-"),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Whether reconciliation passes draw progress bars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgressMode {
    #[default]
    Visible,
    Hidden,
}

impl ProgressMode {
    /// Starts a bar for a pass over `len` items, labelled with `message`.
    pub fn bar(self, len: usize, message: &'static str) -> ProgressBar {
        let bar = match self {
            Self::Visible => ProgressBar::new(len as u64),
            Self::Hidden => ProgressBar::hidden(),
        };
        bar.set_style(default_style());
        bar.set_message(message);
        bar
    }
}
