pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod form;
pub mod notify;
pub mod poller;
pub mod render;
pub mod session;
pub mod state;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::session::Confirm;
use crate::store::DocumentStore;
use crate::task::View;

#[tracing::instrument(skip_all)]
pub async fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting checklist CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.checklistrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = Arc::new(
    datastore::FileStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open task store at \
         {}",
        data_dir.display()
      )
    })?
  );

  let view = match cli.view.as_deref() {
    | Some(raw) => {
      raw.parse::<View>().with_context(
        || format!("invalid view: {raw}")
      )?
    }
    | None => cfg.default_view()?
  };

  let confirm: Box<dyn Confirm> =
    if cli.yes
      || !cfg
        .get_bool("confirm")
        .unwrap_or(true)
    {
      Box::new(session::AssumeYes)
    } else {
      Box::new(commands::PromptConfirm)
    };
  let notifier = Arc::new(
    notify::TerminalNotifier::new(
      cfg
        .get_bool("notifications")
        .unwrap_or(true)
    )
  );

  let shared: Arc<dyn DocumentStore> =
    store.clone();
  let mut session =
    session::Session::open(
      shared,
      view,
      cfg.session_settings()?,
      confirm,
      notifier
    )
    .await
    .context(
      "failed to read tasks"
    )?;

  let renderer =
    render::Renderer::new(&cfg);
  let command = cli
    .command
    .unwrap_or(cli::Command::List);

  commands::dispatch(
    &mut session,
    &store,
    &cfg,
    &renderer,
    command
  )
  .await
}
