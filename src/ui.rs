use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table,
    },
};

use crate::domain::CMDMode;
use crate::model::{Model, UIData};

pub const HINTBAR_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 2;

const OPEN_PROMPT: &str = "Open file: ";

#[derive(Debug, Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [hint_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(HINTBAR_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        self.draw_hint(uidata, frame, hint_area);
        if uidata.table.is_empty() {
            let placeholder = Paragraph::new("No spreadsheet loaded")
                .alignment(Alignment::Center)
                .dark_gray();
            frame.render_widget(placeholder, table_area);
        } else {
            self.draw_table(uidata, frame, table_area);
        }
        self.draw_statusline(uidata, frame, status_area);

        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_hint(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut spans = vec![" namesort ".bold().black().on_cyan()];
        if !uidata.name.is_empty() {
            spans.push(format!(" {} ", uidata.name).yellow());
        }
        spans.push(Span::raw(" "));
        spans.push(Span::raw(uidata.hint.as_str()));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [table_area, scroll_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(SCROLLBAR_WIDTH as u16),
        ])
        .areas(area);

        let header_style = |idx: usize, chosen: bool| {
            let mut style = Style::default().add_modifier(Modifier::BOLD);
            if chosen {
                style = style.fg(Color::Green).add_modifier(Modifier::UNDERLINED);
            }
            if idx == uidata.selected_column {
                style = style.add_modifier(Modifier::REVERSED);
            }
            style
        };

        let header = Row::new(uidata.table.iter().enumerate().map(|(idx, column)| {
            let name = if column.chosen {
                format!("▸{}", column.name)
            } else {
                column.name.clone()
            };
            Cell::from(name).style(header_style(idx, column.chosen))
        }));

        let visible_rows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..visible_rows).map(|ridx| {
            Row::new(uidata.table.iter().enumerate().map(|(cidx, column)| {
                let text = column.data.get(ridx).map(String::as_str).unwrap_or("");
                let mut style = Style::default();
                if column.chosen {
                    style = style.fg(Color::Green);
                }
                if cidx == uidata.selected_column {
                    style = style.bg(Color::DarkGray);
                    if ridx == uidata.selected_row {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                }
                Cell::from(text).style(style)
            }))
        });

        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));
        let table = Table::new(rows, widths).header(header).column_spacing(1);
        frame.render_widget(table, table_area);

        let mut scroll_state =
            ScrollbarState::new(uidata.nrows).position(uidata.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scroll_area,
            &mut scroll_state,
        );
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput {
            let prompt = match uidata.cmd_mode {
                Some(CMDMode::OpenFile) | None => OPEN_PROMPT,
            };
            let line = Line::from(vec![prompt.bold(), Span::raw(uidata.cmdinput.input.as_str())]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x as usize + prompt.len() + uidata.cmdinput.cursor_pos;
            frame.set_cursor_position((x.min(u16::MAX as usize) as u16, area.y));
            return;
        }

        let message = if uidata.status_is_error {
            uidata.status_message.as_str().red()
        } else {
            uidata.status_message.as_str().into()
        };
        let position = if uidata.nrows > 0 {
            format!(" {}/{} ", uidata.abs_selected_row + 1, uidata.nrows)
        } else {
            String::new()
        };
        let [left, right] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(position.len() as u16),
        ])
        .areas(area);
        frame.render_widget(Paragraph::new(Line::from(message)), left);
        frame.render_widget(Paragraph::new(position).alignment(Alignment::Right), right);
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = popup_area(frame.area(), 60, 60);
        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .title_bottom(Line::from(vec![" Close ".into(), "<Esc> ".blue().bold()]).centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(uidata.popup_message.as_str()).block(block), area);
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}
