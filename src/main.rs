use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use tracing::{info, warn};

use anicat::{
    app::App,
    catalog::{AnimetizeClient, CatalogApi, ListRoute},
    config::Settings,
    logging::setup_logging,
    playback::{LoadOutcome, PlaybackSession, parse_quality},
    player::{self, PlaybackRequest, PlayerExit},
    render,
    storage::{JsonFileStore, KeyValueStore, default_storage_path},
    types::episode_identifier,
};

#[derive(Debug, Parser)]
#[command(
    name = "anicat",
    about = "Browse an anime catalog and play episodes via mpv.",
    version
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/anicat/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Streaming server to request sources from.
    #[arg(long, global = true)]
    server: Option<String>,

    /// How many result pages to fetch per list.
    #[arg(long, global = true, value_name = "N")]
    pages: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Latest episodes, top airing anime and popular movies.
    Home,
    /// Recently released episodes.
    Recent,
    /// Top airing anime.
    Top,
    /// Popular movies.
    Movies,
    /// List the available genres.
    Genres,
    /// Anime in a genre, by name or id.
    Genre { genre: Vec<String> },
    /// Search the catalog.
    Search { query: Vec<String> },
    /// Show details for an anime.
    Info {
        id: String,
        /// Open the anime's page (or cover image) in the browser.
        #[arg(long)]
        open: bool,
    },
    /// Play an anime, resuming where you left off.
    Watch {
        id: String,
        #[arg(short = 'e', long, value_name = "EPISODE")]
        episode: Option<u32>,
        /// Episode URL as listed by the catalog; its last path segment picks the episode.
        #[arg(long, value_name = "URL", conflicts_with = "episode")]
        episode_url: Option<String>,
        /// Quality label to play, e.g. 720p. Defaults to the highest available.
        #[arg(short = 'q', long)]
        quality: Option<String>,
    },
    /// Recently watched episodes.
    History {
        /// Pick an entry and continue watching it.
        #[arg(long)]
        play: bool,
    },
    /// Bookmarked anime.
    Bookmarks,
    /// Add or remove a bookmark.
    Bookmark { id: String },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        settings.server = server.clone();
    }
    if let Some(pages) = cli.pages {
        settings.page_limit = pages;
    }

    let storage_path = default_storage_path(settings.data_dir.as_deref())?;
    let data_dir = storage_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let _log_guard = setup_logging(&settings, &data_dir)?;

    let store = Arc::new(JsonFileStore::open(&storage_path)?);
    let catalog = AnimetizeClient::new(&settings.api_base_url, settings.request_timeout())?;
    info!(
        storage = %store.path().display(),
        api = %catalog.base_url(),
        server = %settings.server,
        "starting anicat"
    );
    let app = App::new(catalog, store, settings.server.clone(), settings.page_limit);

    match cli.command.unwrap_or(Command::Home) {
        Command::Home => print!("{}", app.home().await),
        Command::Recent => {
            print!("{}", app.list_section("Latest Episodes", &ListRoute::RecentEpisodes).await)
        }
        Command::Top => {
            print!("{}", app.list_section("Top Airing Anime", &ListRoute::TopAiring).await)
        }
        Command::Movies => {
            print!("{}", app.list_section("Popular Movies", &ListRoute::Movies).await)
        }
        Command::Genres => print!("{}", app.genres().await),
        Command::Genre { genre } => {
            if genre.is_empty() {
                println!("No genre provided. Use `anicat genre <name>`.");
                return Ok(());
            }
            print!("{}", app.genre_section(&genre.join(" ")).await)
        }
        Command::Search { query } => print!("{}", app.search(&query.join(" ")).await),
        Command::Info { id, open } => {
            print!("{}", app.info(&id).await?);
            if open {
                open_in_browser(&app, &id).await;
            }
        }
        Command::Watch {
            id,
            episode,
            episode_url,
            quality,
        } => {
            watch(&app, &settings, &id, episode, episode_url.as_deref(), quality.as_deref()).await?
        }
        Command::History { play } => {
            if play {
                replay_from_history(&app, &settings).await?;
            } else {
                print!("{}", app.history()?);
            }
        }
        Command::Bookmarks => print!("{}", app.bookmarked_items().await?),
        Command::Bookmark { id } => println!("{}", app.toggle_bookmark(&id)?),
        Command::Config => print!("{}", settings.to_toml()?),
    }
    Ok(())
}

async fn open_in_browser<C: CatalogApi, S: KeyValueStore>(app: &App<C, S>, anime_id: &str) {
    let target = match app.catalog.fetch_catalog_item(anime_id).await {
        Ok(item) => item.url.filter(|u| !u.is_empty()).unwrap_or(item.image),
        Err(_) => return,
    };
    if target.is_empty() {
        println!("Nothing to open for {anime_id}.");
        return;
    }
    if let Err(err) = open::that(&target) {
        warn!(error = %err, %target, "could not open browser");
        println!("Could not open {target}: {err}");
    }
}

async fn replay_from_history<C: CatalogApi, S: KeyValueStore>(
    app: &App<C, S>,
    settings: &Settings,
) -> Result<()> {
    let recent = app.progress.recently_watched()?;
    if recent.is_empty() {
        println!("History is empty.");
        return Ok(());
    }
    let items: Vec<String> = recent.iter().map(render::progress_line).collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Select an entry to continue (Esc to cancel)")
        .items(&items)
        .default(0)
        .interact_opt()?;
    let Some(idx) = selection else {
        println!("Cancelled.");
        return Ok(());
    };
    let entry = &recent[idx];
    watch(app, settings, &entry.anime_id, Some(entry.episode), None, None).await
}

async fn watch<C: CatalogApi, S: KeyValueStore>(
    app: &App<C, S>,
    settings: &Settings,
    anime_id: &str,
    requested_episode: Option<u32>,
    episode_url: Option<&str>,
    quality: Option<&str>,
) -> Result<()> {
    let mut session = match app.open_session(anime_id).await {
        Ok(session) => session,
        Err(err) => {
            print!("{}", render::inline_error("anime info", &err));
            return Ok(());
        }
    };
    let title = session.title().unwrap_or(anime_id).to_string();

    let requested = match episode_url {
        Some(url) => {
            let wanted = episode_identifier(url);
            let found = session
                .episodes()
                .iter()
                .find(|ep| ep.identifier() == wanted)
                .map(|ep| ep.number);
            if found.is_none() {
                println!("Episode '{wanted}' is not listed for '{title}'.");
            }
            found
        }
        None => requested_episode,
    };
    if let Some(n) = requested {
        if !session.episodes().iter().any(|ep| ep.number == n) {
            println!("Episode {n} does not exist for '{title}'. Starting elsewhere.");
        }
    }
    let mut current = app.starting_episode(&session, requested)?;
    println!("{title}: {} episodes.", session.episodes().len());

    loop {
        println!("Fetching streams for episode {current}...");
        match app.load_episode(&mut session, current, quality).await? {
            LoadOutcome::Ready => {}
            LoadOutcome::Stale => continue,
            LoadOutcome::Failed(err) => {
                print!("{}", render::inline_error("streaming links", &err));
                match pick_episode(&session, current)? {
                    Some(n) => {
                        current = n;
                        continue;
                    }
                    None => return Ok(()),
                }
            }
        }

        if quality.is_none() {
            choose_quality(&mut session)?;
        }

        let mut start_at = app.resume_point(anime_id, current)?;
        if let Some(t) = start_at {
            println!("Resuming episode {current} at {}.", render::format_timestamp(t));
        }

        let next = loop {
            let exit = match play_current(&session, settings, &title, current, start_at).await {
                Ok(exit) => exit,
                Err(err) => {
                    warn!(error = %err, episode = current, "playback failed");
                    print!("{}", render::playback_error(current, &err));
                    break pick_episode(&session, current)?;
                }
            };
            match exit {
                PlayerExit::Paused { time } => {
                    session.pause(time, &app.progress)?;
                    println!(
                        "Saved episode {current} at {}.",
                        render::format_timestamp(time)
                    );
                    match after_pause(&session, current)? {
                        AfterPause::Resume => {
                            session.resume()?;
                            start_at = Some(time);
                        }
                        AfterPause::Episode(n) => break Some(n),
                        AfterPause::Quit => break None,
                    }
                }
                PlayerExit::Ended => {
                    let upcoming = session.end()?;
                    break match upcoming {
                        Some(ep) => {
                            let play_next = Confirm::with_theme(&theme())
                                .with_prompt(format!("Play episode {}?", ep.number))
                                .default(true)
                                .interact_opt()?
                                .unwrap_or(false);
                            if play_next { Some(ep.number) } else { None }
                        }
                        None => {
                            println!("No further episodes found. Exiting.");
                            None
                        }
                    };
                }
            }
        };

        match next {
            Some(n) => current = n,
            None => return Ok(()),
        }
    }
}

async fn play_current(
    session: &PlaybackSession,
    settings: &Settings,
    title: &str,
    episode: u32,
    start_at: Option<f64>,
) -> Result<PlayerExit> {
    let streams = session
        .streams()
        .context("no streams loaded for the current episode")?;
    let source = session
        .selected_source()
        .context("no stream source selected")?;
    let request = PlaybackRequest {
        source,
        captions: &streams.captions,
        referer: streams.referer.as_deref(),
        title,
        episode,
        start_at,
    };
    player::launch_player(&settings.player, &request).await
}

fn choose_quality(session: &mut PlaybackSession) -> Result<()> {
    let Some(streams) = session.streams() else {
        return Ok(());
    };
    if streams.sources.len() < 2 {
        return Ok(());
    }
    let mut sources = streams.sources.clone();
    sources.sort_by_key(|s| std::cmp::Reverse(parse_quality(&s.quality)));
    let labels: Vec<String> = sources.iter().map(|s| s.label()).collect();
    let default_idx = session
        .selected_source()
        .and_then(|sel| sources.iter().position(|s| s.url == sel.url))
        .unwrap_or(0);
    let selection = Select::with_theme(&theme())
        .with_prompt("Select a quality")
        .items(&labels)
        .default(default_idx)
        .interact_opt()?;
    if let Some(idx) = selection {
        session.switch_quality(&sources[idx].quality)?;
    }
    Ok(())
}

enum AfterPause {
    Resume,
    Episode(u32),
    Quit,
}

fn after_pause(session: &PlaybackSession, current: u32) -> Result<AfterPause> {
    let next = session.next_episode().map(|ep| ep.number);
    let mut options = vec![String::from("Resume")];
    if let Some(n) = next {
        options.push(format!("Next episode ({n})"));
    }
    options.push(String::from("Choose episode"));
    options.push(String::from("Quit"));

    let selection = Select::with_theme(&theme())
        .with_prompt("Playback paused")
        .items(&options)
        .default(0)
        .interact_opt()?;
    let Some(idx) = selection else {
        return Ok(AfterPause::Quit);
    };
    Ok(match options[idx].as_str() {
        "Resume" => AfterPause::Resume,
        "Choose episode" => match pick_episode(session, current)? {
            Some(n) => AfterPause::Episode(n),
            None => AfterPause::Quit,
        },
        "Quit" => AfterPause::Quit,
        _ => match next {
            Some(n) => AfterPause::Episode(n),
            None => AfterPause::Quit,
        },
    })
}

fn pick_episode(session: &PlaybackSession, current: u32) -> Result<Option<u32>> {
    let episodes = session.episodes();
    if episodes.is_empty() {
        bail!("no episodes to choose from");
    }
    let labels: Vec<String> = episodes.iter().map(|ep| format!("Episode {}", ep.number)).collect();
    let default_idx = episodes
        .iter()
        .position(|ep| ep.number == current)
        .unwrap_or(0);
    let selection = Select::with_theme(&theme())
        .with_prompt("Episode to play (Enter to select, Esc to cancel)")
        .items(&labels)
        .default(default_idx)
        .interact_opt()?;
    Ok(selection.map(|idx| episodes[idx].number))
}

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}
