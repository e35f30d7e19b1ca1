use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use escapepods::{
    Config, EpisodeEntity, Library, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient,
    SharedProgressReporter, UpdateOutcome, Upsert,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");
static RETRY: Emoji<'_, '_> = Emoji("🔁 ", "[r] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");

/// Subscribe to podcasts and download their episodes
#[derive(Parser, Debug)]
#[command(name = "escapepods")]
#[command(about = "Subscribe to podcasts and download their episodes")]
#[command(version)]
struct Args {
    /// Directory holding the collection, episode database and audio
    #[arg(short, long, env = "ESCAPEPODS_DATA_DIR", default_value = "escapepods-data", global = true)]
    data_dir: PathBuf,

    /// Minutes between two collection updates (unless forced)
    #[arg(long, env = "ESCAPEPODS_UPDATE_INTERVAL", default_value = "60", global = true)]
    update_interval: u64,

    /// Maximum number of concurrent downloads
    #[arg(short = 'c', long, env = "ESCAPEPODS_CONCURRENT", default_value = "3", global = true)]
    concurrent: usize,

    /// How often a failed download is retried
    #[arg(long, env = "ESCAPEPODS_RETRIES", default_value = "2", global = true)]
    retries: u32,

    /// HTTP connect and read timeout in seconds
    #[arg(long, env = "ESCAPEPODS_TIMEOUT", default_value = "30", global = true)]
    timeout: u64,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug messages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a podcast by its RSS feed URL
    Add { url: String },

    /// Subscribe to a podcast from a local RSS file
    Import {
        file: PathBuf,

        /// Feed URL to identify the podcast by, instead of the file location
        #[arg(long)]
        feed_url: Option<String>,
    },

    /// Re-read the feeds of all subscribed podcasts
    Update {
        /// Update even if the last update was recent
        #[arg(short, long)]
        force: bool,
    },

    /// List subscribed podcasts
    List,

    /// List stored episodes, newest first
    Episodes {
        /// Podcast name or feed URL; all podcasts when omitted
        podcast: Option<String>,

        /// Maximum number of episodes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Download episodes of a podcast that are not on disk yet
    Download {
        /// Podcast name or feed URL
        podcast: String,

        /// Maximum number of episodes to download
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Unsubscribe from a podcast
    Remove {
        /// Podcast name or feed URL
        podcast: String,
    },

    /// Look up a stored episode
    Find {
        #[arg(long, conflicts_with = "title", required_unless_present = "title")]
        guid: Option<String>,

        /// Title pattern, `%` matches any text
        #[arg(long)]
        title: Option<String>,
    },
}

impl Command {
    fn reports_progress(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::Import { .. } | Self::Update { .. } | Self::Download { .. }
        )
    }
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<usize, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars();

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        if let Some(bar) = self.bars().remove(&download_id) {
            bar.finish_and_clear();
        }
    }

    /// Clear whatever is still on screen
    fn finish(&self) {
        for (_, bar) in self.bars().drain() {
            bar.finish_and_clear();
        }
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::ParsingFeed { source } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Reading feed: {}", source.cyan()));
            }

            ProgressEvent::PodcastAdded {
                podcast_name,
                episode_count,
            }
            | ProgressEvent::PodcastUpdated {
                podcast_name,
                episode_count,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes",
                    podcast_name.bold().green(),
                    episode_count.to_string().cyan()
                ));
            }

            ProgressEvent::DownloadPlanReady {
                podcast_name,
                total_episodes,
                new_episodes,
                to_download,
                without_audio,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes total, {} new, {} to download",
                    podcast_name.bold().green(),
                    total_episodes.to_string().cyan(),
                    new_episodes.to_string().yellow(),
                    to_download.to_string().yellow()
                ));
                if without_audio > 0 {
                    let _ = self.multi.println(
                        format!("{without_audio} episode(s) have no audio")
                            .dimmed()
                            .to_string(),
                    );
                }
            }

            ProgressEvent::DownloadStarting {
                download_id,
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadRetrying {
                download_id,
                episode_title,
                attempt,
                error,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_message(format!(
                    "{RETRY}{} - retry {} ({})",
                    truncate_title(&episode_title, 30).yellow(),
                    attempt,
                    error.dimmed()
                ));
            }

            ProgressEvent::Finalizing {
                download_id,
                episode_title,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_message(format!("{} (finalizing)", truncate_title(&episode_title, 40)));
            }

            ProgressEvent::HashingCompleted { .. } => {}

            ProgressEvent::DownloadCompleted {
                download_id,
                episode_title,
                bytes_downloaded,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_position(bytes_downloaded);
                bar.set_message(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode_title, 40).green()
                ));
                self.finish_bar(download_id);
            }

            ProgressEvent::DownloadFailed {
                download_id,
                episode_title,
                error,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
                self.bars().remove(&download_id);
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                let _ = self.multi.println(format!(
                    "{BROOM}{}",
                    format!("Removed {count} unfinished download(s)").dimmed()
                ));
            }

            ProgressEvent::DownloadsCompleted {
                downloaded_count,
                existing_count,
                limited_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} already present, {} over limit, {} failed",
                    "Downloads complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    existing_count.to_string().yellow(),
                    limited_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "warn,escapepods=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_episode(episode: &EpisodeEntity) {
    let date = episode
        .publication_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let marker = if episode.local_audio_file_location.is_some() {
        DOWNLOAD.to_string()
    } else {
        "   ".to_string()
    };

    println!(
        "  {}{} {} {}",
        marker,
        date.dimmed(),
        episode.title.bold(),
        format!("({})", episode.podcast_name).dimmed()
    );
}

async fn run(args: &Args, library: &mut Library<ReqwestClient>) -> Result<()> {
    match &args.command {
        Command::Add { url } => {
            let podcast = library
                .add_podcast(url)
                .await
                .with_context(|| format!("Failed to add podcast {url}"))?;
            println!(
                "{SUCCESS}Added {} with {} episodes",
                podcast.name.bold().green(),
                podcast.episodes.len().to_string().cyan()
            );
        }

        Command::Import { file, feed_url } => {
            let upsert = library
                .import_feed_file(file, feed_url.as_deref())
                .await
                .with_context(|| format!("Failed to import {}", file.display()))?;
            let verb = match upsert {
                Upsert::Added => "Imported",
                Upsert::Replaced => "Re-imported",
            };
            println!("{SUCCESS}{verb} {}", file.display().to_string().cyan());
        }

        Command::Update { force } => {
            match library
                .update_collection(*force)
                .await
                .context("Failed to update collection")?
            {
                UpdateOutcome::TooSoon { next_update_in } => {
                    println!(
                        "{HEADPHONES}Collection was updated recently; next update in {} minutes (use {} to update now)",
                        next_update_in.num_minutes().max(1).to_string().yellow(),
                        "--force".cyan()
                    );
                }
                UpdateOutcome::Updated { updated, failed } => {
                    println!(
                        "{SUCCESS}Updated {} podcast(s)",
                        updated.to_string().green().bold()
                    );
                    if !failed.is_empty() {
                        println!("\n{}", "Failed feeds:".red().bold());
                        for (location, error) in &failed {
                            println!("  {}{} - {}", CROSS, location.yellow(), error.dimmed());
                        }
                    }
                }
            }
        }

        Command::List => {
            if library.podcasts().is_empty() {
                println!("No podcasts yet. Add one with {}", "escapepods add <url>".cyan());
            }
            for podcast in library.podcasts() {
                println!(
                    "{HEADPHONES}{} • {} episodes\n     {}",
                    podcast.name.bold().green(),
                    podcast.episodes.len().to_string().cyan(),
                    podcast.remote_podcast_feed_location.dimmed()
                );
            }
            if let Some(last_update) = library.collection().last_update {
                println!(
                    "\n{}",
                    format!("Last update: {}", last_update.format("%Y-%m-%d %H:%M UTC")).dimmed()
                );
            }
        }

        Command::Episodes { podcast, limit } => {
            let episodes = library
                .episodes(podcast.as_deref())
                .context("Failed to load episodes")?;
            for episode in episodes.iter().take(*limit) {
                print_episode(episode);
            }
            if episodes.len() > *limit {
                println!("  {}", format!("... and {} more", episodes.len() - limit).dimmed());
            }
        }

        Command::Download { podcast, limit } => {
            let summary = library
                .download_episodes(podcast, *limit)
                .await
                .with_context(|| format!("Failed to download episodes of {podcast}"))?;

            if !args.quiet && !summary.failed_episodes.is_empty() {
                println!("\n{}", "Failed episodes:".red().bold());
                for (title, error) in &summary.failed_episodes {
                    println!("  {}{} - {}", CROSS, title.yellow(), error.dimmed());
                }
            }

            if !args.quiet {
                let audio_dir = library
                    .collection()
                    .find(podcast)
                    .map(|p| library.config().audio_dir(p));
                if let Some(audio_dir) = audio_dir {
                    println!(
                        "\n{FOLDER}Output: {}\n",
                        audio_dir.display().to_string().cyan()
                    );
                }
            }
        }

        Command::Remove { podcast } => {
            let removed = library
                .remove_podcast(podcast)
                .with_context(|| format!("Failed to remove {podcast}"))?;
            println!("{SUCCESS}Removed {}", removed.name.bold());
        }

        Command::Find { guid, title } => {
            let found = match (guid, title) {
                (Some(guid), _) => library.store().find_by_guid(guid),
                (None, Some(title)) => library.store().find_by_title(title),
                (None, None) => bail!("Either --guid or --title is required"),
            }
            .context("Failed to search episodes")?;

            match found {
                Some(episode) => {
                    print_episode(&episode);
                    if let Some(remote) = &episode.remote_audio_file_location {
                        println!("     {}", remote.dimmed());
                    }
                    if let Some(local) = &episode.local_audio_file_location {
                        println!("     {FOLDER}{}", local.cyan());
                    }
                    if let Some(hash) = &episode.content_hash {
                        println!("     {}", hash.dimmed());
                    }
                }
                None => bail!("No matching episode"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "escapepods".bold().magenta(),
            "- Podcast Manager".dimmed()
        );
    }

    let config = Config {
        data_dir: args.data_dir.clone(),
        update_interval: Duration::from_secs(args.update_interval.saturating_mul(60)),
        max_concurrent: args.concurrent,
        retries: args.retries,
        http_timeout: Duration::from_secs(args.timeout),
    };

    let client = ReqwestClient::with_timeout(config.http_timeout)
        .context("Failed to set up HTTP client")?;

    let progress = (!args.quiet && args.command.reports_progress())
        .then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &progress {
        Some(progress) => progress.clone(),
        None => NoopReporter::shared(),
    };

    let mut library = Library::open(client, config, reporter).with_context(|| {
        format!("Failed to open library in {}", args.data_dir.display())
    })?;

    let result = run(&args, &mut library).await;

    if let Some(progress) = &progress {
        progress.finish();
    }

    result
}
