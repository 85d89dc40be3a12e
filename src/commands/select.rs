//! Terminal front end for the interactive selector.

use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::debug;

use crate::application::{
    InstalledMap, SelectionState, SessionContext, Selector, SelectorInput, SelectorState, execute,
    scan_catalog,
};

const HELP: &str = "arrows/hjkl move  space toggle  s scope  enter apply  esc cancel";

/// Source of selector inputs.
#[cfg_attr(test, mockall::automock)]
pub trait KeySource {
    /// Block until the next recognised input.
    fn next_input(&mut self) -> Result<SelectorInput>;
}

/// Reads keys from the terminal in raw mode.
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn next_input(&mut self) -> Result<SelectorInput> {
        loop {
            if let Event::Key(key) = event::read().context("Failed to read key")?
                && let Some(input) = map_key(key)
            {
                return Ok(input);
            }
        }
    }
}

pub fn map_key(key: KeyEvent) -> Option<SelectorInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(SelectorInput::Cancel);
    }
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(SelectorInput::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(SelectorInput::Down),
        KeyCode::Left | KeyCode::Char('h') => Some(SelectorInput::Left),
        KeyCode::Right | KeyCode::Char('l') => Some(SelectorInput::Right),
        KeyCode::Char(' ') => Some(SelectorInput::ToggleSelection),
        KeyCode::Char('s') | KeyCode::Tab => Some(SelectorInput::ToggleScope),
        KeyCode::Enter => Some(SelectorInput::Commit),
        KeyCode::Esc | KeyCode::Char('q') => Some(SelectorInput::Cancel),
        _ => None,
    }
}

/// Raw mode and the alternate screen for as long as this lives.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = crossterm::execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e).context("Failed to prepare terminal");
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Draw the grid. `[x]` marks modules to keep, `*` marks modules installed
/// right now, the focused cell is shown inverted.
pub fn render<W: Write>(
    selector: &Selector,
    installed: &InstalledMap,
    out: &mut W,
) -> io::Result<()> {
    let entries = selector.selection().entries();
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0) + 7;

    queue!(
        out,
        Clear(ClearType::All),
        MoveTo(0, 0),
        Print(format!("Select modules (scope: {})", selector.scope())),
        MoveTo(0, 1),
        Print(HELP)
    )?;

    for (index, entry) in entries.iter().enumerate() {
        let row = index / selector.columns();
        let column = index % selector.columns();
        let is_installed = installed
            .get(&entry.name.to_lowercase())
            .is_some_and(|scan| scan.installed);
        let cell = format!(
            "[{}] {}{}",
            if entry.desired { 'x' } else { ' ' },
            entry.name,
            if is_installed { "*" } else { "" }
        );

        queue!(out, MoveTo((column * width) as u16, (row + 3) as u16))?;
        if index == selector.focus() {
            queue!(
                out,
                SetAttribute(Attribute::Reverse),
                Print(cell),
                SetAttribute(Attribute::Reset)
            )?;
        } else {
            queue!(out, Print(cell))?;
        }
    }
    out.flush()
}

/// Drive the selector until it is committed or cancelled.
pub fn run_selector<K: KeySource + ?Sized, W: Write>(
    mut selector: Selector,
    keys: &mut K,
    installed: &InstalledMap,
    screen: &mut W,
) -> Result<Selector> {
    loop {
        render(&selector, installed, screen)?;
        let input = keys.next_input()?;
        debug!("Selector input: {:?}", input);
        if selector.apply(input) != SelectorState::Browsing {
            return Ok(selector);
        }
    }
}

/// Apply what the operator chose, diffing against a fresh scan.
pub async fn finish(ctx: &SessionContext, selector: &Selector, out: &mut dyn Write) -> Result<()> {
    if selector.state() != SelectorState::Committed {
        writeln!(out, "Cancelled, nothing changed.")?;
        return Ok(());
    }

    let installed = scan_catalog(ctx).await;
    let plan = selector.plan(&installed);
    if plan.is_empty() {
        writeln!(out, "Nothing to change.")?;
        return Ok(());
    }
    if !plan.install.is_empty() {
        writeln!(out, "Installing for {}: {}", selector.scope(), plan.install.join(", "))?;
    }
    if !plan.uninstall.is_empty() {
        writeln!(out, "Removing: {}", plan.uninstall.join(", "))?;
    }

    let report = execute(ctx, &plan, selector.scope(), out).await?;
    writeln!(out, "{}", report.summary())?;
    Ok(())
}

#[tracing::instrument(skip(ctx, out))]
pub async fn select(ctx: &SessionContext, columns: usize, out: &mut dyn Write) -> Result<()> {
    let installed = scan_catalog(ctx).await;
    let selection = SelectionState::from_installed(&ctx.catalog, &installed);
    let selector = Selector::new(selection, columns, ctx.options.scope);

    let selector = {
        let _guard = TerminalGuard::enter()?;
        run_selector(selector, &mut TerminalKeys, &installed, &mut io::stdout())?
    };
    finish(ctx, &selector, out).await
}
