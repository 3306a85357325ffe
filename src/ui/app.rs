use crate::catalog::{ColumnFilter, LevelCount, Stats};
use crate::engine::{ColumnCatalog, Scope};
use crate::model::ColumnRecord;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{DefaultTerminal, Frame};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Browse,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusPanel {
    Levels,
    Columns,
}

pub struct App {
    pub catalog: Arc<ColumnCatalog>,
    pub source: String,
    pub input_mode: InputMode,
    pub focus_panel: FocusPanel,
    pub search_input: String,
    pub selected_level: usize, // 0 = "All", 1+ = level index
    pub selected_row: usize,
    pub status: Option<String>,
    pub should_quit: bool,
    levels: Vec<LevelCount>,
    visible: Vec<ColumnRecord>,
}

impl App {
    #[must_use]
    pub fn new(catalog: Arc<ColumnCatalog>, source: String) -> Self {
        let mut app = Self {
            levels: catalog.levels(),
            catalog,
            source,
            input_mode: InputMode::Browse,
            focus_panel: FocusPanel::Columns,
            search_input: String::new(),
            selected_level: 0,
            selected_row: 0,
            status: None,
            should_quit: false,
            visible: Vec::new(),
        };
        app.apply_filter();
        app
    }

    #[must_use]
    pub fn with_status(mut self, status: String) -> Self {
        self.status = Some(status);
        self
    }

    /// Starts with a search term and level already applied.
    #[must_use]
    pub fn with_filter(mut self, term: String, level: Option<&str>) -> Self {
        self.search_input = term;
        self.selected_level = level
            .and_then(|wanted| self.levels.iter().position(|l| l.level == wanted))
            .map_or(0, |index| index + 1);
        self.apply_filter();
        self
    }

    pub fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| self.draw(frame))?;
            self.handle_events()?;
        }
        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        super::dashboard::draw_dashboard(frame, self);
    }

    fn handle_events(&mut self) -> Result<()> {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                return Ok(());
            }
            self.handle_key(key.code);
        }
        Ok(())
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match self.input_mode {
            InputMode::Browse => self.handle_browse_keys(code),
            InputMode::Search => self.handle_search_keys(code),
        }
    }

    fn handle_browse_keys(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('/') => self.input_mode = InputMode::Search,
            KeyCode::Char('c') => self.clear_filter(),
            KeyCode::Up | KeyCode::Char('k') => self.navigate_up(),
            KeyCode::Down | KeyCode::Char('j') => self.navigate_down(),
            KeyCode::Left | KeyCode::Char('h') => self.focus_panel = FocusPanel::Levels,
            KeyCode::Right | KeyCode::Char('l') => self.focus_panel = FocusPanel::Columns,
            KeyCode::PageUp => self.selected_row = self.selected_row.saturating_sub(10),
            KeyCode::PageDown => {
                self.selected_row = (self.selected_row + 10).min(self.visible.len().saturating_sub(1));
            }
            _ => {}
        }
    }

    fn handle_search_keys(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter | KeyCode::Esc => self.input_mode = InputMode::Browse,
            KeyCode::Backspace => {
                self.search_input.pop();
                self.apply_filter();
            }
            KeyCode::Char(c) => {
                self.search_input.push(c);
                self.apply_filter();
            }
            _ => {}
        }
    }

    fn navigate_up(&mut self) {
        match self.focus_panel {
            FocusPanel::Levels => {
                if self.selected_level > 0 {
                    self.selected_level -= 1;
                    self.apply_filter();
                }
            }
            FocusPanel::Columns => self.selected_row = self.selected_row.saturating_sub(1),
        }
    }

    fn navigate_down(&mut self) {
        match self.focus_panel {
            FocusPanel::Levels => {
                // 0 = "All", then levels
                if self.selected_level < self.levels.len() {
                    self.selected_level += 1;
                    self.apply_filter();
                }
            }
            FocusPanel::Columns => {
                if self.selected_row < self.visible.len().saturating_sub(1) {
                    self.selected_row += 1;
                }
            }
        }
    }

    fn clear_filter(&mut self) {
        self.search_input.clear();
        self.selected_level = 0;
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let mut filter = ColumnFilter::term(self.search_input.clone());
        if let Some(level) = self.selected_level_filter() {
            filter = filter.with_level(level);
        }
        self.visible = self.catalog.set_filter(filter);
        self.selected_row = 0;
    }

    /// Level of the selected entry, `None` for "All".
    fn selected_level_filter(&self) -> Option<String> {
        if self.selected_level == 0 {
            None
        } else {
            self.levels
                .get(self.selected_level - 1)
                .map(|l| l.level.clone())
        }
    }

    #[must_use]
    pub fn levels(&self) -> &[LevelCount] {
        &self.levels
    }

    /// Records matching the current search and level.
    #[must_use]
    pub fn visible_columns(&self) -> &[ColumnRecord] {
        &self.visible
    }

    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.catalog.filter().is_empty()
    }

    /// Stats for the cards: the filtered set while a filter is active.
    #[must_use]
    pub fn card_stats(&self) -> Stats {
        if self.is_filtered() {
            self.catalog.stats(Scope::Filtered)
        } else {
            self.catalog.stats(Scope::All)
        }
    }

    #[must_use]
    pub fn get_selected_level_name(&self) -> String {
        match self.selected_level_filter() {
            None => "All".to_string(),
            Some(level) if level.is_empty() => "Unspecified".to_string(),
            Some(level) => level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn app() -> App {
        let catalog = Arc::new(ColumnCatalog::new());
        catalog
            .load_model(
                r#"[
                    {"id":"COL-001","name":"Колонна 300x300","type":"Прямоугольная","level":"Уровень 1","height":3500,"material":"Бетон B25"},
                    {"id":"COL-002","name":"Колонна Ø350","type":"Круглая","level":"Уровень 2","height":3200,"material":"Бетон B25"},
                    {"id":"COL-003","name":"Колонна 400x400","type":"Прямоугольная","level":"Уровень 2","height":3200,"material":"Бетон B30"}
                ]"#.as_bytes(),
                "json",
            )
            .unwrap();
        App::new(catalog, "model.json".to_string())
    }

    fn visible_ids(app: &App) -> Vec<&str> {
        app.visible_columns().iter().map(ColumnRecord::id).collect()
    }

    #[test]
    fn typing_in_search_mode_filters_columns() {
        let mut app = app();
        assert_eq!(visible_ids(&app).len(), 3);

        app.handle_key(KeyCode::Char('/'));
        for c in "b30".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        assert_eq!(visible_ids(&app), vec!["COL-003"]);
        assert!(app.is_filtered());
        assert_eq!(app.card_stats().total, 1);

        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Backspace);
        assert_eq!(visible_ids(&app).len(), 3);
        app.handle_key(KeyCode::Char('2'));
        assert_eq!(visible_ids(&app), vec!["COL-001", "COL-002"]);

        // 'q' is text while searching
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.should_quit);
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Browse);
    }

    #[test]
    fn level_panel_filters_by_level() {
        let mut app = app();
        app.handle_key(KeyCode::Left);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Down);

        assert_eq!(app.get_selected_level_name(), "Уровень 2");
        assert_eq!(visible_ids(&app), vec!["COL-002", "COL-003"]);

        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_level, 2);

        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.get_selected_level_name(), "All");
        assert_eq!(visible_ids(&app).len(), 3);

        let app = app.with_filter("b25".to_string(), Some("Уровень 2"));
        assert_eq!(app.selected_level, 2);
        assert_eq!(visible_ids(&app), vec!["COL-002"]);

        let app = app.with_filter(String::new(), None);
        assert_eq!(visible_ids(&app).len(), 3);
        assert!(!app.is_filtered());
    }

    #[test]
    fn row_navigation_stays_in_bounds() {
        let mut app = app();
        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected_row, 0);
        for _ in 0..5 {
            app.handle_key(KeyCode::Down);
        }
        assert_eq!(app.selected_row, 2);
        app.handle_key(KeyCode::PageUp);
        assert_eq!(app.selected_row, 0);
        app.handle_key(KeyCode::PageDown);
        assert_eq!(app.selected_row, 2);
        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}
