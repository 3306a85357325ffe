use crate::model::Shape;
use crate::ui::app::{App, FocusPanel, InputMode};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table,
    },
    Frame,
};

// Brandbook colors
const BRAND_DARK: Color = Color::Rgb(0x1F, 0x2F, 0x3C); // #1f2f3c
const BRAND_ACCENT: Color = Color::Rgb(0x58, 0x6B, 0x71); // #586b71
const BRAND_SELECT_BG: Color = Color::Rgb(0xC3, 0xD3, 0xE0); // #c3d3e0
const BRAND_GREEN: Color = Color::Rgb(0x82, 0x9A, 0x68); // #829a68
const BRAND_ORANGE: Color = Color::Rgb(0x9E, 0x68, 0x3C); // #9e683c
const BRAND_MUTED: Color = Color::Rgb(0x71, 0x65, 0x65); // #716565

// Styles
const HEADER_STYLE: Style = Style::new().fg(BRAND_DARK).add_modifier(Modifier::BOLD);
const SELECTED_STYLE: Style = Style::new()
    .bg(BRAND_SELECT_BG)
    .fg(BRAND_DARK)
    .add_modifier(Modifier::BOLD);
const CARD_VALUE_STYLE: Style = Style::new().fg(BRAND_GREEN).add_modifier(Modifier::BOLD);
const CIRCULAR_COLOR: Color = BRAND_ACCENT;

pub fn draw_dashboard(frame: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3), // Header
        Constraint::Length(4), // Stat cards
        Constraint::Length(3), // Search
        Constraint::Min(8),    // Levels + table
        Constraint::Length(3), // Footer
    ])
    .split(frame.area());

    draw_header(frame, chunks[0], app);
    draw_cards(frame, chunks[1], app);
    draw_search(frame, chunks[2], app);
    draw_main_content(frame, chunks[3], app);

    let help = match app.input_mode {
        InputMode::Browse => " / Search | ←→ Panel | ↑↓ Navigate | c Clear | q Quit ",
        InputMode::Search => " Type to filter | Backspace Delete | Enter/Esc Done ",
    };
    draw_footer(frame, chunks[4], help);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut title = format!(
        " Column Catalog | {} | {} columns ",
        app.source,
        app.catalog.count()
    );
    if let Some(status) = &app.status {
        title.push_str(&format!("| {status} "));
    }

    let header = Paragraph::new(title)
        .style(HEADER_STYLE)
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(header, area);
}

fn draw_cards(frame: &mut Frame, area: Rect, app: &App) {
    let stats = app.card_stats();
    let chunks = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(area);

    let cards = [
        ("Всего колонн", stats.total.to_string()),
        ("Прямоугольные", stats.count(Shape::Rectangular).to_string()),
        ("Круглые", stats.count(Shape::Circular).to_string()),
        ("Средняя высота", format!("{:.0} мм", stats.average_height)),
    ];

    for ((label, value), chunk) in cards.into_iter().zip(chunks.iter()) {
        let card = Paragraph::new(Line::from(Span::styled(value, CARD_VALUE_STYLE))).block(
            Block::default()
                .title(format!(" {label} "))
                .borders(Borders::ALL),
        );
        frame.render_widget(card, *chunk);
    }
}

fn draw_search(frame: &mut Frame, area: Rect, app: &App) {
    let is_editing = app.input_mode == InputMode::Search;
    let border_style = if is_editing {
        Style::default().fg(BRAND_ORANGE)
    } else {
        Style::default()
    };

    let mut spans = vec![Span::raw(app.search_input.as_str())];
    if is_editing {
        spans.push(Span::styled("▏", Style::default().fg(BRAND_ORANGE)));
    } else if app.search_input.is_empty() {
        spans.push(Span::styled(
            "Поиск по колоннам...",
            Style::default().fg(BRAND_MUTED),
        ));
    }

    let search = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(format!(
                " Search | Level: {} ",
                app.get_selected_level_name()
            ))
            .borders(Borders::ALL)
            .border_style(border_style),
    );
    frame.render_widget(search, area);
}

fn draw_main_content(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::horizontal([
        Constraint::Percentage(20), // Levels
        Constraint::Percentage(80), // Columns
    ])
    .split(area);

    draw_levels(frame, chunks[0], app);
    draw_columns(frame, chunks[1], app);
}

fn draw_levels(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus_panel == FocusPanel::Levels;
    let all_count = app.catalog.count();

    let entries = std::iter::once(("All".to_string(), all_count)).chain(
        app.levels().iter().map(|l| {
            let name = if l.level.is_empty() {
                "Unspecified".to_string()
            } else {
                l.level.clone()
            };
            (name, l.count)
        }),
    );

    let items: Vec<ListItem> = entries
        .enumerate()
        .map(|(i, (name, count))| {
            let is_selected = i == app.selected_level;
            let style = if is_selected && is_focused {
                SELECTED_STYLE
            } else if is_selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let marker = if is_selected && is_focused {
                " ◄"
            } else {
                ""
            };

            ListItem::new(Line::from(vec![
                Span::styled(name, style),
                Span::styled(format!(" ({count})"), Style::default().fg(BRAND_GREEN)),
                Span::styled(marker, Style::default().fg(BRAND_ORANGE)),
            ]))
        })
        .collect();

    let border_style = if is_focused {
        Style::default().fg(BRAND_ORANGE)
    } else {
        Style::default()
    };

    let title = format!(" Levels ({}) ", app.levels().len() + 1); // +1 for "All"
    let list = List::new(items).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style),
    );

    frame.render_widget(list, area);
}

fn draw_columns(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus_panel == FocusPanel::Columns;
    let columns = app.visible_columns();

    // Subtract borders and header row
    let visible_rows = (area.height as usize).saturating_sub(3);
    let scroll_offset = if app.selected_row >= visible_rows {
        app.selected_row - visible_rows + 1
    } else {
        0
    };

    let header = Row::new(vec!["ID", "Название", "Тип", "Уровень", "Высота, мм", "Материал"])
        .style(HEADER_STYLE)
        .height(1);

    let rows: Vec<Row> = columns
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_rows)
        .map(|(i, column)| {
            let is_selected = i == app.selected_row;
            let style = if is_selected && is_focused {
                SELECTED_STYLE
            } else if is_selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let shape_style = match column.shape() {
                Shape::Circular => Style::default().fg(CIRCULAR_COLOR),
                Shape::Rectangular => Style::default(),
                Shape::Other => Style::default().fg(BRAND_MUTED),
            };

            Row::new(vec![
                Line::from(column.id().to_string()),
                Line::from(column.name().to_string()),
                Line::from(Span::styled(column.shape().source_label(), shape_style)),
                Line::from(column.level_label().to_string()),
                Line::from(format!("{:.0}", column.height())),
                Line::from(column.material().to_string()),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Percentage(14),
        Constraint::Percentage(24),
        Constraint::Percentage(14),
        Constraint::Percentage(16),
        Constraint::Percentage(12),
        Constraint::Percentage(20),
    ];

    let border_style = if is_focused {
        Style::default().fg(BRAND_ORANGE)
    } else {
        Style::default()
    };

    let title = format!(" Список колонн ({} найдено) ", columns.len());
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style),
    );

    frame.render_widget(table, area);

    if columns.len() > visible_rows && area.height > 3 && area.width > 0 {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));
        let mut scrollbar_state = ScrollbarState::new(columns.len()).position(app.selected_row);

        let scrollbar_area = Rect {
            x: area.x + area.width - 1,
            y: area.y + 2,
            width: 1,
            height: area.height - 3,
        };
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, help: &str) {
    let footer = Paragraph::new(help)
        .style(Style::default().fg(BRAND_MUTED))
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(footer, area);
}
