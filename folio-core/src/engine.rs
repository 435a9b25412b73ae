use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::history::EditHistory;
use crate::parser::{self, Document, TocEntry};
use crate::search::{self, LiteralReplacer};

pub type DocumentId = Uuid;

const WELCOME_TEXT: &str = "\
Welcome to Folio
Pages are separated by a line containing only three dashes.
---
Search is case-insensitive and replace works on every page at once.
---
Every edit can be undone and redone until the next document is loaded.";

const WELCOME_TITLE: &str = "Welcome";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load { raw: String, title: String },
    EditPage { page_index: usize, text: String },
    ReplaceAll { query: String, replacement: String },
    Undo,
    Redo,
    ToggleBookmark { page: usize },
    GotoPage { page: usize },
    NextPage { count: usize },
    PrevPage { count: usize },
    Search { query: String },
    ClearSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    DocumentLoaded(DocumentId),
    ContentChanged(DocumentId),
    PageChanged(DocumentId),
    BookmarksChanged(DocumentId),
    SearchChanged(DocumentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub title: String,
    pub page_count: usize,
    pub current_page: usize,
    pub search_term: String,
    pub search_results: Vec<usize>,
    pub bookmarks: Vec<usize>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub dirty: bool,
}

/// Edit-state engine for a single paginated text document.
///
/// `document` is the baseline from the last load or save; `pages` is the working copy that
/// edits, replacements and history moves operate on. Both always have the same length.
/// Page numbers are 1-based everywhere except [`DocumentEngine::edit_page`], which takes a
/// 0-based index.
pub struct DocumentEngine {
    id: DocumentId,
    document: Document,
    pages: Vec<String>,
    history: EditHistory,
    bookmarks: Vec<usize>,
    current_page: usize,
    search_term: String,
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl DocumentEngine {
    /// Empty, untitled document.
    pub fn new(history: EditHistory) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: Document::default(),
            pages: Vec::new(),
            history,
            bookmarks: Vec::new(),
            current_page: 1,
            search_term: String::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_text(raw: &str, title: &str) -> Self {
        let mut engine = Self::new(EditHistory::new());
        engine.load_document(raw, title);
        engine
    }

    pub fn with_welcome(history: EditHistory) -> Self {
        let mut engine = Self::new(history);
        engine.load_document(WELCOME_TEXT, WELCOME_TITLE);
        engine
    }

    pub fn events(&self) -> Arc<Mutex<Vec<EngineEvent>>> {
        Arc::clone(&self.events)
    }

    /// Removes and returns every queued event.
    pub fn take_events(&self) -> Vec<EngineEvent> {
        mem::take(&mut *self.events.lock())
    }

    pub fn apply(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Load { raw, title } => self.load_document(&raw, &title),
            Command::EditPage { page_index, text } => self.edit_page(page_index, text)?,
            Command::ReplaceAll { query, replacement } => self.replace_all(&query, &replacement),
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
            Command::ToggleBookmark { page } => self.toggle_bookmark(page),
            Command::GotoPage { page } => self.set_current_page(page),
            Command::NextPage { count } => self.next_page(count),
            Command::PrevPage { count } => self.prev_page(count),
            Command::Search { query } => self.search(&query),
            Command::ClearSearch => self.search(""),
        }
        Ok(())
    }

    /// Replaces the whole document. History is discarded, bookmarks are kept as they are.
    #[instrument(skip(self, raw))]
    pub fn load_document(&mut self, raw: &str, title: &str) {
        let document = parser::parse(raw, title);
        self.pages = document.pages.clone();
        self.document = document;
        self.history.reset();
        self.current_page = 1;
        self.search_term.clear();
        self.id = Uuid::new_v4();
        info!(id = %self.id, pages = self.pages.len(), "document loaded");
        self.emit(EngineEvent::DocumentLoaded(self.id));
    }

    #[instrument(skip(self, text), fields(len = self.pages.len()))]
    pub fn edit_page(
        &mut self,
        page_index: usize,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        if page_index >= self.pages.len() {
            warn!(page_index, "rejected edit outside document");
            return Err(EngineError::PageIndexOutOfRange {
                index: page_index,
                len: self.pages.len(),
            });
        }
        self.history.record(self.pages.clone());
        self.pages[page_index] = text.into();
        debug!(page_index, "page edited");
        self.emit(EngineEvent::ContentChanged(self.id));
        Ok(())
    }

    /// Replaces every case-insensitive occurrence of `query` on every page.
    ///
    /// Both strings must be non-empty; otherwise nothing happens.
    #[instrument(skip(self))]
    pub fn replace_all(&mut self, query: &str, replacement: &str) {
        if replacement.is_empty() {
            return;
        }
        let Some(replacer) = LiteralReplacer::new(query) else {
            return;
        };
        self.history.record(self.pages.clone());
        for page in &mut self.pages {
            *page = replacer.replace_all(page, replacement);
        }
        debug!("replacement applied");
        self.emit(EngineEvent::ContentChanged(self.id));
        if !self.search_term.is_empty() {
            self.search_term.clear();
            self.emit(EngineEvent::SearchChanged(self.id));
        }
    }

    pub fn undo(&mut self) {
        if let Some(previous) = self.history.undo(self.pages.clone()) {
            self.pages = previous;
            debug!(undo_depth = self.history.undo_depth(), "undo");
            self.emit(EngineEvent::ContentChanged(self.id));
        }
    }

    pub fn redo(&mut self) {
        if let Some(next) = self.history.redo(self.pages.clone()) {
            self.pages = next;
            debug!(redo_depth = self.history.redo_depth(), "redo");
            self.emit(EngineEvent::ContentChanged(self.id));
        }
    }

    pub fn toggle_bookmark(&mut self, page: usize) {
        if let Some(pos) = self.bookmarks.iter().position(|&p| p == page) {
            self.bookmarks.remove(pos);
        } else {
            self.bookmarks.push(page);
        }
        self.emit(EngineEvent::BookmarksChanged(self.id));
    }

    pub fn set_current_page(&mut self, page: usize) {
        // Out-of-range requests are ignored, not clamped.
        if page == 0 || page > self.pages.len() || page == self.current_page {
            return;
        }
        self.current_page = page;
        self.emit(EngineEvent::PageChanged(self.id));
    }

    pub fn next_page(&mut self, count: usize) {
        if let Some(page) = self.current_page.checked_add(count) {
            self.set_current_page(page);
        }
    }

    pub fn prev_page(&mut self, count: usize) {
        if let Some(page) = self.current_page.checked_sub(count) {
            self.set_current_page(page);
        }
    }

    pub fn search(&mut self, query: &str) {
        if self.search_term != query {
            self.search_term = query.to_string();
            self.emit(EngineEvent::SearchChanged(self.id));
        }
    }

    pub fn mark_saved(&mut self) {
        self.document.pages = self.pages.clone();
    }

    pub fn export_text(&self) -> String {
        parser::serialize(&self.pages)
    }

    pub fn export_file_name(&self) -> String {
        parser::export_file_name(&self.document.title)
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn title(&self) -> &str {
        &self.document.title
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_text(&self, page: usize) -> Option<&str> {
        page.checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .map(String::as_str)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn current_page_text(&self) -> Option<&str> {
        self.page_text(self.current_page)
    }

    pub fn table_of_contents(&self) -> &[TocEntry] {
        &self.document.table_of_contents
    }

    /// Bookmarked page numbers in the order they were added.
    pub fn bookmarks(&self) -> &[usize] {
        &self.bookmarks
    }

    pub fn is_bookmarked(&self, page: usize) -> bool {
        self.bookmarks.contains(&page)
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn search_results(&self) -> Vec<usize> {
        search::find_matches(&self.pages, &self.search_term)
    }

    pub fn search_summary(&self) -> String {
        search::join_page_numbers(&self.search_results())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_dirty(&self) -> bool {
        self.pages != self.document.pages
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            title: self.document.title.clone(),
            page_count: self.pages.len(),
            current_page: self.current_page,
            search_term: self.search_term.clone(),
            search_results: self.search_results(),
            bookmarks: self.bookmarks.clone(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            dirty: self.is_dirty(),
        }
    }

    fn emit(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

impl Default for DocumentEngine {
    fn default() -> Self {
        Self::with_welcome(EditHistory::new())
    }
}
