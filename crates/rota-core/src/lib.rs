pub mod adapter;
pub mod approval;
pub mod backend;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod grouping;
pub mod holiday;
pub mod http;
pub mod loader;
pub mod model;
pub mod render;
pub mod store;
pub mod wire;

use std::ffi::OsString;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::config::{
  BackendKind,
  Config
};
use crate::http::{
  HttpBackend,
  HttpConfig
};
use crate::store::{
  Actor,
  ScheduleStore
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
    "starting rota CLI"
  );
  debug!(
    count = pre.rc_overrides.len(),
    "preprocessed rc overrides"
  );

  let mut cfg = Config::load(
    cli.rotarc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  match cfg.backend_kind()? {
    | BackendKind::File => {
      let store = open_store(
        &cfg,
        cli.data.as_deref()
      )?;
      let session = commands::Session {
        backend: &store,
        store:   Some(&store)
      };
      commands::dispatch(
        &session, &cfg, &renderer, inv
      )?;
    }
    | BackendKind::Http => {
      let http = open_http(&cfg)?;
      let session = commands::Session {
        backend: &http,
        store:   None
      };
      commands::dispatch(
        &session, &cfg, &renderer, inv
      )?;
    }
  }

  info!("done");
  Ok(())
}

/// File store in the resolved data
/// directory, acting as the configured
/// user.
pub fn open_store(
  cfg: &Config,
  data_override: Option<&Path>
) -> anyhow::Result<ScheduleStore> {
  let data_dir =
    config::resolve_data_dir(
      cfg,
      data_override
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let actor = Actor {
    id:   cfg
      .get("user.id")
      .unwrap_or_default(),
    name: cfg
      .get("user.name")
      .unwrap_or_default()
  };

  let store =
    ScheduleStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open schedule \
           store at {}",
          data_dir.display()
        )
      })?
      .with_actor(actor)
      .with_password(
        cfg.get("auth.password")
      );
  Ok(store)
}

pub fn open_http(
  cfg: &Config
) -> anyhow::Result<HttpBackend> {
  let http_cfg = HttpConfig {
    base_url: cfg
      .get("api.url")
      .unwrap_or_default(),
    token:    cfg.get("api.token"),
    timeout:  cfg.api_timeout()?
  };
  HttpBackend::new(http_cfg).context(
    "failed to configure HTTP backend"
  )
}
