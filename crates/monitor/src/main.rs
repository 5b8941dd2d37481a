use std::collections::{HashMap, VecDeque};
use std::{io, time::Duration};

use anyhow::Result;
use bytes::BytesMut;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::interval;

use brasadb_common::{DEFAULT_HOST, DEFAULT_PORT};
use brasadb_protocol::Frame as WireFrame;

#[derive(Parser, Debug)]
#[command(name = "brasadb-monitor", about = "Monitor TUI for BrasaDB")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

/// Contadores exibidos no painel da esquerda, na ordem.
const PANEL_METRICS: &[(&str, &str)] = &[
    ("brasadb_memory_bytes", "memória (bytes)"),
    ("brasadb_connections_active", "conexões ativas"),
    ("brasadb_connections_total", "conexões totais"),
    ("brasadb_aof_writes_total", "escritas AOF"),
    ("brasadb_aof_errors_total", "erros AOF"),
    ("brasadb_expired_keys_total", "chaves expiradas"),
];

struct App {
    samples: VecDeque<(f64, f64)>,
    window_size: usize,
    x_offset: f64,
    snapshot: HashMap<String, f64>,
    last_total: Option<f64>,
}

impl App {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(100),
            window_size: 100,
            x_offset: 0.0,
            snapshot: HashMap::new(),
            last_total: None,
        }
    }

    /// Incorpora um snapshot novo e registra o delta de comandos como
    /// amostra de taxa (um tick = um segundo).
    fn update(&mut self, snapshot: HashMap<String, f64>) {
        let total = total_commands(&snapshot);
        if let Some(last) = self.last_total {
            self.add_point((total - last).max(0.0));
        }
        self.last_total = Some(total);
        self.snapshot = snapshot;
    }

    fn add_point(&mut self, y: f64) {
        self.x_offset += 1.0;
        if self.samples.len() >= self.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back((self.x_offset, y));
    }

    fn to_dataset(&self) -> Vec<(f64, f64)> {
        self.samples.iter().cloned().collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    // Setup do terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let mut ticker = interval(Duration::from_secs(1));

    let mut stream = TcpStream::connect(&addr).await?;

    // Loop de UI
    loop {
        terminal.draw(|f| ui(f, &app, &addr))?;

        // Input não bloqueante
        if event::poll(Duration::from_millis(0))?
            && let Event::Key(key) = event::read()?
            && key.code == KeyCode::Char('q')
        {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                match fetch_metrics(&mut stream).await {
                    Ok(text) => app.update(parse_exposition(&text)),
                    Err(_) => break,
                }
            }
        }
    }

    // Restaurar o terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Manda METRICS e devolve o texto da exposição Prometheus.
async fn fetch_metrics(stream: &mut TcpStream) -> Result<String> {
    let mut buf = BytesMut::new();
    WireFrame::array_from_strs(&["METRICS"]).encode(&mut buf);
    stream.write_all(&buf).await?;

    let mut response = BytesMut::with_capacity(4096);
    loop {
        if stream.read_buf(&mut response).await? == 0 {
            anyhow::bail!("servidor fechou a conexão");
        }

        let mut cursor = std::io::Cursor::new(&response[..]);
        if WireFrame::check(&mut cursor).is_ok() {
            cursor.set_position(0);
            let frame =
                WireFrame::parse(&mut cursor).map_err(|e| anyhow::anyhow!("parse error: {e}"))?;
            return match frame {
                WireFrame::Bulk(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
                other => anyhow::bail!("resposta inesperada ao METRICS: {other:?}"),
            };
        }
    }
}

/// Parseia o formato de texto do Prometheus: uma métrica por linha,
/// `nome valor`, comentários começam com `#`. Labels ficam no nome.
fn parse_exposition(text: &str) -> HashMap<String, f64> {
    let mut metrics = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, value)) = line.rsplit_once(' ')
            && let Ok(value) = value.parse::<f64>()
        {
            metrics.insert(name.to_string(), value);
        }
    }
    metrics
}

/// Extrai os contadores por comando da série `brasadb_commands_total`,
/// ordenados por nome.
fn command_counts(snapshot: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut rows: Vec<(String, f64)> = snapshot
        .iter()
        .filter_map(|(name, value)| {
            let rest = name.strip_prefix("brasadb_commands_total{command=\"")?;
            let cmd = rest.strip_suffix("\"}")?;
            Some((cmd.to_string(), *value))
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn total_commands(snapshot: &HashMap<String, f64>) -> f64 {
    command_counts(snapshot).iter().map(|(_, v)| v).sum()
}

fn ui(f: &mut Frame, app: &App, addr: &str) {
    let size = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Percentage(50),
        ])
        .split(size);

    // Cabeçalho
    let title = Paragraph::new(format!("BrasaDB Monitor - {addr} (q para sair)"))
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(title, chunks[0]);

    // Painéis de contadores
    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let mut lines = Vec::new();
    for (metric, label) in PANEL_METRICS {
        let value = app.snapshot.get(*metric).copied().unwrap_or(0.0);
        lines.push(format!("{label:<20} {value:>12.0}"));
    }
    let counters = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Servidor"))
        .style(Style::default().fg(Color::White));
    f.render_widget(counters, panels[0]);

    let mut lines = Vec::new();
    for (cmd, count) in command_counts(&app.snapshot) {
        lines.push(format!("{cmd:<20} {count:>12.0}"));
    }
    let commands = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Comandos"))
        .style(Style::default().fg(Color::White));
    f.render_widget(commands, panels[1]);

    // Gráfico de taxa
    let data_points = app.to_dataset();
    let dataset = vec![
        Dataset::default()
            .name("ops/s")
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(Color::Yellow))
            .graph_type(GraphType::Line)
            .data(&data_points),
    ];

    let x_labels = vec![
        Span::styled(
            format!("{:.0}", app.x_offset - app.window_size as f64),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{:.0}", app.x_offset),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];

    let max_y = app.samples.iter().map(|(_, y)| *y).fold(0.0, f64::max) + 10.0;

    let chart = Chart::new(dataset)
        .block(
            Block::default()
                .title("Comandos por segundo")
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Tempo (s)")
                .style(Style::default().fg(Color::Gray))
                .bounds([app.x_offset - app.window_size as f64, app.x_offset])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title("ops/s")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, max_y])
                .labels(vec![
                    Span::raw("0"),
                    Span::styled(
                        format!("{:.0}", max_y),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
        );

    f.render_widget(chart, chunks[2]);
}
