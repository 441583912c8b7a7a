use crate::export::ExportFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Search-results post harvester (headless scroll + DOM extraction)")]
pub struct Args {
    /// Search query, e.g. "Andrés Iniesta retirement".
    #[arg(long, short = 'q')]
    pub query: String,

    #[arg(long, short = 'n')]
    pub max_posts: Option<usize>,

    #[arg(long, short = 'f', value_enum)]
    pub format: Option<ExportFormat>,

    /// Output path; defaults to <output_dir>/results.<ext>.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub headless: bool,

    #[arg(long, default_value_t = false)]
    pub no_headless: bool,

    #[arg(long, default_value = "config/settings.json")]
    pub settings: PathBuf,

    /// Seconds to wait after each scroll.
    #[arg(long)]
    pub scroll_pause: Option<f64>,

    #[arg(long)]
    pub max_scroll: Option<usize>,

    #[arg(long)]
    pub stall_limit: Option<usize>,

    #[arg(long)]
    pub locale: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_and_defaults() {
        let a = Args::try_parse_from(["post_harvester", "-q", "rust lang", "-n", "20", "-f", "csv"]).unwrap();
        assert_eq!(a.query, "rust lang");
        assert_eq!(a.max_posts, Some(20));
        assert_eq!(a.format, Some(ExportFormat::Csv));
        assert_eq!(a.settings, PathBuf::from("config/settings.json"));
        assert!(!a.headless && !a.no_headless);
    }

    #[test]
    fn query_is_required() {
        assert!(Args::try_parse_from(["post_harvester", "-n", "5"]).is_err());
    }
}
