//! Headless campaign chat host.
//!
//! ## Engine bootstrap
//!
//! `campaign_chat` requires explicit engine selection:
//!
//! - `CAMPAIGN_CHAT_ENGINE=mock` for the deterministic scripted producer
//! - `CAMPAIGN_CHAT_ENGINE=http` for a live producer over HTTP
//!
//! The mock engine answers with the block script by default; set
//! `CAMPAIGN_CHAT_MOCK_SCRIPT=partial` for the field-by-field script and
//! `CAMPAIGN_CHAT_STEP_DELAY_MS` to slow it down. The http engine posts to
//! `CAMPAIGN_CHAT_ENDPOINT` (default `http://127.0.0.1:3000`).
//!
//! History is kept in `.campaign/history.json` under the working directory
//! unless `CAMPAIGN_STREAM_HISTORY_PATH` points elsewhere, and is saved after
//! every stream reaches a terminal state.

pub mod app;
pub mod commands;
pub mod engines;
pub mod runtime;
