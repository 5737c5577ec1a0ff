//! chatbridge - an HTTP gateway for a single chat-network account.
//!
//! # Architecture
//!
//! ```text
//!  HTTP ──▶ handlers ──▶ normalize / GroupResolver ──▶ Dispatcher ──▶ SessionProvider
//!                                                    ▲ (one send at a time)
//!                                       broadcast ───┘
//!
//!  SessionProvider ──ProviderEvent──▶ SessionManager ──▶ SessionHandle (readiness)
//!                                          └── Message ──▶ InboundRelay ──▶ webhook
//! ```

pub mod address;
pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod group;
pub mod handlers;
pub mod provider;
pub mod relay;
pub mod response;
pub mod server;
pub mod session;
