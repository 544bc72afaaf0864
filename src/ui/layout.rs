use crate::app::{App, AppView, Panel};
use fastspeed::settings::SettingsField;
use fastspeed::speedtest::TestPhase;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};
use std::rc::Rc;

const ACCENT: Color = Color::Rgb(100, 149, 237);
const DOWNLOAD: Color = Color::Rgb(134, 194, 156);
const DOWNLOAD_DIM: Color = Color::Rgb(80, 120, 90);
const STREAM: Color = Color::Rgb(147, 180, 220);
const STREAM_DIM: Color = Color::Rgb(90, 110, 140);
const PENDING: Color = Color::Rgb(220, 180, 130);
const FAILED: Color = Color::Rgb(220, 120, 120);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

const SEPARATOR: &str = "  ·  ";

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();
    if app.view == AppView::Settings {
        draw_settings_view(frame, area, app);
        return;
    }

    let [header, body, footer] = screen_rows(area);
    draw_header(frame, header, app);

    if app.expanded {
        match app.selected_panel {
            Panel::Throughput => draw_throughput_expanded(frame, body, app),
            Panel::Streams => draw_streams(frame, body, app, true, true),
        }
    } else {
        let columns =
            Layout::horizontal([Constraint::Ratio(3, 5), Constraint::Ratio(2, 5)]).split(body);
        draw_throughput(frame, columns[0], app, app.selected_panel == Panel::Throughput);
        draw_streams(frame, columns[1], app, app.selected_panel == Panel::Streams, false);
    }

    draw_help(frame, footer, app);
}

fn screen_rows(area: Rect) -> [Rect; 3] {
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .split(area);
    [rows[0], rows[1], rows[2]]
}

fn fg(color: Color) -> Style {
    Style::default().fg(color)
}

fn bold(color: Color) -> Style {
    fg(color).add_modifier(Modifier::BOLD)
}

fn muted<'a>(text: impl Into<std::borrow::Cow<'a, str>>) -> Span<'a> {
    Span::styled(text, fg(TEXT_MUTED))
}

/// Bordered panel; returns the inner area.
fn panel(frame: &mut Frame, area: Rect, title: &str, color: Color, selected: bool) -> Rect {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(fg(if selected { BORDER_ACTIVE } else { BORDER }))
        .title(Span::styled(
            format!(" {} ", title),
            fg(if selected { color } else { TEXT_SECONDARY }),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    inner
}

fn centered(frame: &mut Frame, area: Rect, line: impl Into<Line<'static>>) {
    frame.render_widget(Paragraph::new(line.into()).alignment(Alignment::Center), area);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::BOTTOM).border_style(fg(BORDER));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let columns = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new("fastspeed").style(bold(TEXT_PRIMARY)),
        columns[0],
    );

    let (status, color) = match app.phase {
        TestPhase::Idle => ("Ready", TEXT_MUTED),
        TestPhase::Discovering => ("Finding servers...", PENDING),
        TestPhase::Measuring => ("Measuring download...", DOWNLOAD),
        TestPhase::Complete if app.failure.is_some() => ("No connection", FAILED),
        TestPhase::Complete => ("Complete", ACCENT),
    };
    centered(frame, columns[1], Span::styled(status, fg(color)));

    frame.render_widget(
        Paragraph::new(phase_steps(app.phase)).alignment(Alignment::Right),
        columns[2],
    );
}

fn phase_steps(phase: TestPhase) -> Line<'static> {
    let find = match phase {
        TestPhase::Discovering => bold(ACCENT),
        TestPhase::Measuring | TestPhase::Complete => fg(TEXT_SECONDARY),
        TestPhase::Idle => fg(TEXT_MUTED),
    };
    let measure = match phase {
        TestPhase::Measuring => bold(ACCENT),
        TestPhase::Complete => fg(TEXT_SECONDARY),
        _ => fg(TEXT_MUTED),
    };
    Line::from(vec![
        Span::styled("find", find),
        muted(" / "),
        Span::styled("measure", measure),
    ])
}

fn draw_throughput(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let inner = panel(frame, area, "Download", DOWNLOAD, selected);
    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    centered(
        frame,
        rows[0],
        Span::styled(format_speed(current_speed(app)), bold(TEXT_PRIMARY)),
    );
    centered(frame, rows[1], detail_line(app));
    draw_bar(frame, rows[2], app.progress, DOWNLOAD, DOWNLOAD_DIM);
    draw_chart(frame, rows[3], &app.samples, DOWNLOAD, None);
}

fn draw_throughput_expanded(frame: &mut Frame, area: Rect, app: &App) {
    let inner = panel(frame, area, "Download", DOWNLOAD, true);
    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(inner);

    let (avg, min) = mean_and_min(&app.samples);
    let stats = Line::from(vec![
        Span::styled(format_speed(current_speed(app)), bold(TEXT_PRIMARY)),
        muted(SEPARATOR),
        Span::styled(format!("peak {}", format_speed(app.peak_mbps)), fg(TEXT_SECONDARY)),
        muted(SEPARATOR),
        muted(format!("avg {}", format_speed(avg))),
        muted(SEPARATOR),
        muted(format!("min {}", format_speed(min))),
    ]);
    centered(frame, rows[0], stats);
    draw_bar(frame, rows[1], app.progress, DOWNLOAD, DOWNLOAD_DIM);
    draw_chart(frame, rows[2], &app.samples, DOWNLOAD, Some("Mbps"));
}

fn draw_streams(frame: &mut Frame, area: Rect, app: &App, selected: bool, detailed: bool) {
    let inner = panel(frame, area, "Streams", STREAM, selected);
    if app.per_stream.is_empty() {
        centered(frame, inner, muted("—"));
        return;
    }

    let list_area = if detailed {
        let [summary, rest] = split_top(inner, 2);
        let total: u64 = app.per_stream.iter().sum();
        centered(
            frame,
            summary,
            Line::from(vec![
                Span::styled(format!("{} streams", app.per_stream.len()), bold(TEXT_PRIMARY)),
                muted(SEPARATOR),
                Span::styled(format!("total {}", format_bytes(total)), fg(TEXT_SECONDARY)),
            ]),
        );
        rest
    } else {
        inner
    };

    let rows = stream_rows(list_area, app.per_stream.len());
    let largest = app.per_stream.iter().copied().max().unwrap_or(0).max(1);
    for (i, &bytes) in app.per_stream.iter().enumerate() {
        let host = if detailed {
            app.urls.get(i).and_then(|u| u.host())
        } else {
            None
        };
        let [label, bar] = split_top(rows[i], 1);

        let mut spans = vec![
            Span::styled(format!(" #{}  ", i + 1), fg(TEXT_SECONDARY)),
            Span::styled(format_bytes(bytes), fg(if bytes > 0 { STREAM } else { TEXT_MUTED })),
        ];
        if let Some(host) = host {
            spans.push(muted(SEPARATOR));
            spans.push(muted(host));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), label);
        draw_bar(frame, bar, bytes as f64 / largest as f64, STREAM, STREAM_DIM);
    }
}

fn stream_rows(area: Rect, count: usize) -> Rc<[Rect]> {
    let constraints = (0..count)
        .map(|_| Constraint::Length(2))
        .chain(std::iter::once(Constraint::Min(0)));
    Layout::vertical(constraints).split(area)
}

fn split_top(area: Rect, height: u16) -> [Rect; 2] {
    let parts = Layout::vertical([Constraint::Length(height), Constraint::Min(0)]).split(area);
    [parts[0], parts[1]]
}

fn draw_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio.clamp(0.0, 1.0) * width as f64) as usize).min(width);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), fg(color)),
        Span::styled("━".repeat(width - filled), fg(dim)),
        Span::raw(" "),
    ]);
    frame.render_widget(Paragraph::new(bar), area);
}

/// Line chart of Mbps samples. With a `unit`, draws labelled axes and a
/// reference line at the peak (the figure the run reports).
fn draw_chart(frame: &mut Frame, area: Rect, data: &[f64], color: Color, unit: Option<&str>) {
    let (min_w, min_h) = if unit.is_some() { (10, 3) } else { (4, 2) };
    if data.is_empty() || area.width < min_w || area.height < min_h {
        return;
    }

    let (lo, hi) = bounds(data);
    let pad = (hi - lo).max(if unit.is_some() { 0.1 } else { 1.0 }) * 0.1;
    let y_min = (lo - pad).max(0.0);
    let y_max = hi + pad;
    let x_max = data.len() as f64;

    let points: Vec<(f64, f64)> = data.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();
    let peak = [(0.0, hi), (x_max, hi)];

    let mut datasets = vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(fg(color))
        .data(&points)];

    let mut x_axis = Axis::default().bounds([0.0, x_max]);
    let mut y_axis = Axis::default().bounds([y_min, y_max]);

    if let Some(unit) = unit {
        datasets.push(
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(fg(TEXT_MUTED))
                .data(&peak),
        );
        x_axis = x_axis.style(fg(BORDER));
        y_axis = y_axis.style(fg(BORDER)).labels(vec![
            muted(format!("{:.0}", y_min)),
            muted(format!("{:.0} {}", y_max, unit)),
        ]);
    }

    frame.render_widget(Chart::new(datasets).x_axis(x_axis).y_axis(y_axis), area);
}

fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let [header, body, footer] = screen_rows(area);

    let header_block = Block::default().borders(Borders::BOTTOM).border_style(fg(BORDER));
    let header_inner = header_block.inner(header);
    frame.render_widget(header_block, header);
    frame.render_widget(Paragraph::new("Settings").style(bold(TEXT_PRIMARY)), header_inner);

    let content = Layout::horizontal([
        Constraint::Length(2),
        Constraint::Min(30),
        Constraint::Length(2),
    ])
    .split(body)[1];
    let block = Block::default().borders(Borders::ALL).border_style(fg(BORDER));
    let inner = block.inner(content);
    frame.render_widget(block, content);

    let settings = &app.settings;
    let rows = [
        (
            SettingsField::MaxTime,
            "Duration",
            format!("{} s", settings.max_time_secs),
        ),
        (
            SettingsField::AddressFamily,
            "Address family",
            settings.address_family.label().to_string(),
        ),
        (
            SettingsField::StreamCount,
            "Streams",
            settings.url_count.to_string(),
        ),
    ];
    let areas = Layout::vertical(
        rows.iter()
            .map(|_| Constraint::Length(3))
            .chain(std::iter::once(Constraint::Min(0))),
    )
    .split(inner);

    for (i, (field, label, value)) in rows.iter().enumerate() {
        let selected = app.selected_setting == *field;
        let columns =
            Layout::horizontal([Constraint::Length(16), Constraint::Min(10)]).split(areas[i]);
        frame.render_widget(
            Paragraph::new(format!(" {}", label))
                .style(fg(if selected { ACCENT } else { TEXT_SECONDARY })),
            columns[0],
        );
        let value = if selected {
            Paragraph::new(format!("< {} >", value)).style(fg(TEXT_PRIMARY))
        } else {
            Paragraph::new(value.clone()).style(fg(TEXT_MUTED))
        };
        frame.render_widget(value, columns[1]);
    }

    centered(frame, footer, muted("↑↓ select · ←→ adjust · enter done"));
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = match (app.expanded, app.phase) {
        (true, _) => "esc close · q quit",
        (false, TestPhase::Idle | TestPhase::Complete) => {
            "enter start · s settings · tab select · space expand · q quit"
        }
        (false, _) => "tab select · space expand · esc cancel · q quit",
    };
    centered(frame, area, muted(help));
}

fn current_speed(app: &App) -> f64 {
    match app.estimate {
        Some(estimate) => estimate.mbps(),
        None => app.samples.last().copied().unwrap_or(0.0),
    }
}

fn detail_line(app: &App) -> Line<'static> {
    if let Some(reason) = &app.failure {
        return Line::from(Span::styled(reason.clone(), fg(FAILED)));
    }
    let text = if app.estimate.is_some() {
        format!("peak of {} samples", app.samples.len())
    } else if app.peak_mbps > 0.0 {
        format!("peak {}", format_speed(app.peak_mbps))
    } else {
        String::new()
    };
    Line::from(muted(text))
}

fn bounds(data: &[f64]) -> (f64, f64) {
    let lo = data.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 0.0)
    }
}

fn mean_and_min(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    (mean, bounds(data).0)
}

fn format_speed(mbps: f64) -> String {
    match mbps {
        m if m >= 1000.0 => format!("{:.1} Gbps", m / 1000.0),
        m if m >= 1.0 => format!("{:.1} Mbps", m),
        m if m > 0.0 => format!("{:.0} Kbps", m * 1000.0),
        _ => "—".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * KIB;
    match bytes as f64 {
        b if b == 0.0 => "—".to_string(),
        b if b < MIB => format!("{:.0} KB", b / KIB),
        b => format!("{:.1} MB", b / MIB),
    }
}
