// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) uses these modules to implement the interactive console.
//
// Module responsibilities:
// - `api`: Typed blocking HTTP client for the annotation platform
//   (projects and tasks), plus the `Config` built at the composition root.
// - `sync`: The batched task synchronizer. Pure: works against the
//   `TaskStore` trait, reports progress through a callback, and never
//   prompts or prints.
// - `index`: Local JSON inputs: the project index file and task data files.
// - `ui`: The interactive flows. Prompts, confirmations, and rendering
//   live here and nowhere else.
//
// Keeping this separation means the synchronizer can be tested against an
// in-memory store and the client swapped without touching the flows.
pub mod api;
pub mod index;
pub mod sync;
pub mod ui;
