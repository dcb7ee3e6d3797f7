pub mod analytics;
pub mod bookmaker;
pub mod config;
pub mod error;
pub mod fixture_match;
pub mod handicap;
pub mod http_client;
pub mod lottery_feed;
pub mod pipeline;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod team_alias;
pub mod titan_pages;
pub mod xlsx_export;
