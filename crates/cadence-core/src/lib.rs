pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod countdown;
pub mod datastore;
pub mod datetime;
pub mod occurrence;
pub mod recurrence;
pub mod reminder;
pub mod render;
pub mod scanner;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
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
    "starting cadence CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
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

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command = cli
    .command
    .unwrap_or(cli::Command::Next);

  match datetime::configured_timezone(
    cfg.get("timezone")
  ) {
    | Some(tz) => {
      debug!(%tz, "using configured timezone");
      commands::dispatch(
        &store,
        &cfg,
        &mut renderer,
        command,
        tz
      )?
    }
    | None => {
      debug!("using host local timezone");
      commands::dispatch(
        &store,
        &cfg,
        &mut renderer,
        command,
        Local
      )?
    }
  }

  info!("done");
  Ok(())
}
