//! Kindle "Export Notebook" HTML to Markdown.
//!
//! The export is a flat run of `div`s tagged by class: `bookTitle`,
//! `authors`, `sectionHeading`, `noteHeading` and `noteText`. Elements are
//! walked in document order; a `noteHeading` applies to the next `noteText`.

use crate::types::{Note, Notebook, NotebookSection};
use scraper::{Html, Selector};

pub trait NotebookParser: Send + Sync {
    fn parse(&self, html: &str) -> Notebook;
}

pub trait MarkdownSerializer: Send + Sync {
    fn serialize(&self, notebook: &Notebook) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KindleHtmlParser;

impl NotebookParser for KindleHtmlParser {
    fn parse(&self, html: &str) -> Notebook {
        let document = Html::parse_document(html);
        let Ok(selector) =
            Selector::parse(".bookTitle, .authors, .sectionHeading, .noteHeading, .noteText")
        else {
            return Notebook::default();
        };

        let mut notebook = Notebook::default();
        let mut pending_heading: Option<String> = None;

        for element in document.select(&selector) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            let classes: Vec<&str> = element.value().classes().collect();

            if classes.contains(&"bookTitle") {
                if notebook.title.is_empty() {
                    notebook.title = text;
                }
            } else if classes.contains(&"authors") {
                if !text.is_empty() {
                    notebook.authors = Some(text);
                }
            } else if classes.contains(&"sectionHeading") {
                notebook.sections.push(NotebookSection {
                    heading: Some(text).filter(|t| !t.is_empty()),
                    notes: Vec::new(),
                });
            } else if classes.contains(&"noteHeading") {
                pending_heading = Some(text).filter(|t| !t.is_empty());
            } else if classes.contains(&"noteText") {
                if notebook.sections.is_empty() {
                    notebook.sections.push(NotebookSection::default());
                }
                if let Some(section) = notebook.sections.last_mut() {
                    section.notes.push(Note {
                        heading: pending_heading.take(),
                        text,
                    });
                }
            }
        }

        notebook
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownSerializer for MarkdownRenderer {
    fn serialize(&self, notebook: &Notebook) -> String {
        let mut out = String::new();
        let title = if notebook.title.is_empty() {
            "Kindle Notes"
        } else {
            notebook.title.as_str()
        };
        out.push_str(&format!("# {title}\n"));

        if let Some(authors) = &notebook.authors {
            out.push_str(&format!("\n_{authors}_\n"));
        }

        for section in &notebook.sections {
            if let Some(heading) = &section.heading {
                out.push_str(&format!("\n## {heading}\n"));
            }
            for note in &section.notes {
                out.push('\n');
                if let Some(heading) = &note.heading {
                    out.push_str(&format!("**{heading}**\n\n"));
                }
                for line in note.text.lines() {
                    out.push_str(&format!("> {line}\n"));
                }
            }
        }

        out
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
