use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{Urgency, deadline_urgency};
use crate::task::{Task, View};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.get_bool("color").unwrap_or(true),
        }
    }

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_table(
        &self,
        view: View,
        tasks: &[Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks in {view}.")?;
            return Ok(());
        }
        write_table(&mut out, &self.task_headers(), self.task_rows(tasks, today))?;
        writeln!(out, "\n{} task(s) in {view}", tasks.len())?;
        Ok(())
    }

    fn task_headers(&self) -> Vec<String> {
        ["ID", "Done", "Category", "Name", "Deadline", "Reminders", "Description"]
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    fn task_rows(&self, tasks: &[Task], today: NaiveDate) -> Vec<Vec<String>> {
        tasks
            .iter()
            .map(|task| {
                let id = self.paint(&task.short_id(), "33");
                let done = if task.done { "[x]" } else { "[ ]" }.to_string();
                let name = if task.done {
                    self.paint(&single_line(&task.name), "9")
                } else {
                    single_line(&task.name)
                };

                let deadline = match task.deadline {
                    Some(date) => {
                        let text = date.to_string();
                        match deadline_urgency(date, today) {
                            Urgency::Overdue => self.paint(&text, "31"),
                            Urgency::DueToday => self.paint(&text, "33"),
                            Urgency::Upcoming => text,
                        }
                    }
                    None => String::new(),
                };

                let reminders = if task.reminders.is_empty() {
                    String::new()
                } else {
                    format!("{}/{}", task.fired_reminders.len(), task.reminders.len())
                };

                vec![
                    id,
                    done,
                    task.category.to_string(),
                    name,
                    deadline,
                    reminders,
                    single_line(&task.description),
                ]
            })
            .collect()
    }

    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "name        {}", task.name)?;
        writeln!(out, "category    {}", task.category)?;
        writeln!(out, "done        {}", task.done)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        if let Some(deadline) = task.deadline {
            writeln!(out, "deadline    {deadline}")?;
        }
        for reminder in &task.reminders {
            let mark = if task.has_fired(reminder) { " (fired)" } else { "" };
            writeln!(out, "reminder    {reminder}{mark}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[String],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_text_stays_in_one_row() {
        let task = Task::from_new(
            uuid::Uuid::new_v4(),
            crate::task::NewTask {
                name: "pack\nbags".to_string(),
                description: "passport\r\ntickets\ncharger".to_string(),
                category: crate::task::Category::Personal,
                deadline: None,
                reminders: vec![],
            },
        );
        let renderer = Renderer { color: false };
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let rows = renderer.task_rows(std::slice::from_ref(&task), today);
        assert_eq!(rows[0][3], "pack bags");
        assert_eq!(rows[0][6], "passport tickets charger");
    }

    #[test]
    fn color_accepts_any_config_boolean() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("color".to_string(), "n".to_string())]);
        assert!(!Renderer::new(&cfg).color);
        cfg.apply_overrides([("color".to_string(), "y".to_string())]);
        assert!(Renderer::new(&cfg).color);
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            &["Name".to_string(), "Due".to_string()],
            vec![
                vec!["\x1b[31mtoolong\x1b[0m".to_string(), "x".to_string()],
                vec!["café".to_string(), "y".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name    Due ");
        assert_eq!(lines[1], "------- --- ");
        assert_eq!(lines[3], "café    y   ");
    }
}
