//! Headless list and command state for the plandesk business dashboard.
//!
//! Every dashboard screen is one of two shapes: a paged list that reads its
//! page number from the URL and fetches a window of records, or a form that
//! submits one command and then routes the user somewhere else. This crate
//! owns both shapes without a rendering environment, so each screen's state
//! can be driven and asserted from plain tests or from the `plandesk-cli`
//! front end.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`page`] | Page windows, `page` query parsing, next/previous heuristics |
//! | [`location`] | Injectable URL state and navigation targets |
//! | [`cache`] | Shared collection cache with prefix invalidation |
//! | [`source`] | Collaborator seams: collection fetch and command submit |
//! | [`list`] | [`list::PagedList`] controller (fetch-on-key-change) |
//! | [`mutation`] | [`mutation::MutationFlow`] (submit, invalidate, navigate) |
//! | [`forms`] | Typed command payloads and client-side validation |
//! | [`models`] | Records returned by collection and command endpoints |
//! | [`api`] | `reqwest`-backed HTTP collaborator |
//! | [`screens`] | Per-screen wiring of lists and flows, route table |
//! | [`config`] | Environment-driven client configuration |

pub mod api;
pub mod cache;
pub mod config;
pub mod forms;
pub mod list;
pub mod location;
pub mod models;
pub mod mutation;
pub mod page;
pub mod screens;
pub mod source;
