use crate::lookup::MovieLookupService;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub lookup: MovieLookupService,
}
