//! # Refuge Binary
//!
//! Assembles the content core from settings, then walks the feed and the
//! top post's comment thread once, the way a client session would.

mod seed;

use std::sync::Arc;

use anyhow::Context;
use configs::{LogSettings, Settings};
use domains::{ContentBackend, Entity, ViewKey, Viewer, VoteDirection, VoteState};
use services::{session, CommentTree, ContentServices, MutationDispatcher};
use storage_adapters::InMemoryBackend;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    let backend = build_backend(settings)?;
    let core = ContentServices::new(Arc::clone(&backend));
    let viewer = session::current_viewer(backend.as_ref()).await;
    match viewer.user() {
        Some(user) => info!(user = %user.username, "signed in"),
        None => info!("browsing anonymously"),
    }

    let _feed_view = core.cache.open(ViewKey::Feed);
    let feed = core.model.fetch_feed().await.context("loading feed")?;
    println!("── feed ──");
    for post in &feed {
        println!("{}", line(0, post, &viewer, &core.mutations));
    }

    let Some(top) = feed.first() else {
        info!("feed is empty");
        return Ok(());
    };

    let _comments_view = core.cache.open(ViewKey::Comments(top.id.clone()));
    let mut tree = core.trees.build_tree(&top.id).await?;
    let first_level: Vec<_> = tree.top_level().iter().map(|c| c.id.clone()).collect();
    for id in &first_level {
        core.trees.expand(&mut tree, id).await?;
    }
    print_tree(&tree, &viewer, &core.mutations);

    if viewer.user().is_none() {
        return Ok(());
    }

    let mut notices = core.mutations.subscribe();
    if let Some(comment) = first_level.first() {
        match core.mutations.vote(&viewer, comment, VoteDirection::Up).await {
            Ok(applied) => info!(
                score = applied.value.score(),
                stale = applied.invalidated.len(),
                "voted on top comment"
            ),
            Err(err) => warn!(error = %err, "vote failed"),
        }
        core.trees.refresh(&mut tree).await?;
        print_tree(&tree, &viewer, &core.mutations);
    }
    while let Ok(notice) = notices.try_recv() {
        println!("[{:?}] {}", notice.level, notice.message);
    }

    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_backend(settings: Settings) -> anyhow::Result<Arc<dyn ContentBackend>> {
    let backend = settings.backend;

    #[cfg(feature = "http-reqwest")]
    if let Some(url) = &backend.base_url {
        info!(%url, "using remote content service");
        let http = api_adapters::HttpBackend::new(url, backend.timeout(), backend.session_token)?;
        return Ok(Arc::new(http));
    }

    #[cfg(not(feature = "http-reqwest"))]
    if backend.base_url.is_some() {
        warn!("built without http-reqwest, ignoring backend.base_url");
    }

    info!("using in-memory content service");
    let memory = InMemoryBackend::new();
    if settings.demo.seed {
        let member = seed::seed(&memory).context("seeding demo content")?;
        memory.sign_in(&member)?;
    }
    Ok(Arc::new(memory))
}

fn print_tree(tree: &CommentTree, viewer: &Viewer, mutations: &MutationDispatcher) {
    println!("── comments on {} ──", tree.root());
    for (depth, comment) in tree.walk() {
        let replies = tree
            .comment_count(&comment.id)
            .map(|n| format!(" ({n} replies)"))
            .unwrap_or_default();
        println!("{}{replies}", line(depth + 1, comment, viewer, mutations));
    }
}

fn line(depth: usize, entity: &Entity, viewer: &Viewer, mutations: &MutationDispatcher) -> String {
    let shown = mutations.effective(entity);
    let marker = match shown.vote_state(viewer) {
        VoteState::Up => "▲",
        VoteState::Down => "▼",
        VoteState::Neutral => "·",
    };
    format!(
        "{:indent$}{marker} {:>3}  {}: {}",
        "",
        shown.score(),
        shown.author.display_name,
        shown.content.text,
        indent = depth * 2
    )
}
