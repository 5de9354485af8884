use indicatif::{ProgressBar, ProgressStyle};

const BAR_STYLE: &str = "{prefix:>10.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_STYLE: &str = "{spinner:.blue} {prefix:>10.cyan.bold} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";
const BAR_CHARS: &str = "█▓▒░  ";

/// Byte progress of one file transfer. A bar when the size is known, a
/// spinner otherwise.
pub struct TransferProgress {
    pb: ProgressBar,
}

impl TransferProgress {
    pub fn new(total: Option<u64>, prefix: &str) -> Self {
        let pb = match total {
            Some(len) => {
                let pb = ProgressBar::new(len);
                match ProgressStyle::with_template(BAR_STYLE) {
                    Ok(style) => pb.with_style(style.progress_chars(BAR_CHARS)),
                    Err(_) => pb,
                }
            }
            None => {
                let pb = ProgressBar::new_spinner();
                match ProgressStyle::with_template(SPINNER_STYLE) {
                    Ok(style) => pb.with_style(style.tick_chars(TICK)),
                    Err(_) => pb,
                }
            }
        };
        pb.set_prefix(prefix.to_string());
        Self { pb }
    }

    /// Starts from `offset` bytes, e.g. when resuming a partial file.
    pub fn resume_from(self: &Self, offset: u64) {
        self.pb.set_position(offset);
        self.pb.reset_eta();
    }

    pub fn step(self: &Self, len: u64) {
        self.pb.inc(len);
    }

    pub fn finish(self: Self) {
        self.pb.finish_and_clear();
    }

    pub fn abandon(self: Self) {
        self.pb.abandon();
    }
}
