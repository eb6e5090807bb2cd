use crate::model::DocumentSection;

pub const INTRODUCTION_HEADING: &str = "Introduction";

#[derive(Debug)]
struct SectionNode {
    heading: String,
    level: u8,
    content: Vec<String>,
    children: Vec<usize>,
}

/// Rebuilds heading nesting from a flat node stream.
///
/// Nodes live in an arena and refer to children by index; `open` holds the
/// chain of currently open sections with strictly increasing levels.
#[derive(Debug, Default)]
pub struct SectionTreeBuilder {
    nodes: Vec<SectionNode>,
    roots: Vec<usize>,
    open: Vec<usize>,
    introduction: Vec<String>,
}

impl SectionTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_heading(&mut self, level: u8, heading: String) {
        let level = level.clamp(1, 6);
        let index = self.nodes.len();
        self.nodes.push(SectionNode {
            heading,
            level,
            content: Vec::new(),
            children: Vec::new(),
        });

        while let Some(&top) = self.open.last() {
            if self.nodes[top].level < level {
                break;
            }
            self.open.pop();
        }

        match self.open.last() {
            Some(&parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.open.push(index);
    }

    /// Appends body text to the innermost open section, or to the synthetic
    /// introduction when no heading has been seen yet.
    pub fn append_content(&mut self, text: String) {
        match self.open.last() {
            Some(&current) => self.nodes[current].content.push(text),
            None => self.introduction.push(text),
        }
    }

    pub fn finish(self) -> Vec<DocumentSection> {
        let mut sections = Vec::with_capacity(self.roots.len() + 1);
        if !self.introduction.is_empty() {
            sections.push(DocumentSection {
                heading: INTRODUCTION_HEADING.to_string(),
                level: 1,
                content: self.introduction.join("\n"),
                subsections: Vec::new(),
            });
        }

        for &root in &self.roots {
            sections.push(self.materialize(root));
        }
        sections
    }

    fn materialize(&self, index: usize) -> DocumentSection {
        let node = &self.nodes[index];
        DocumentSection {
            heading: node.heading.clone(),
            level: node.level,
            content: node.content.join("\n"),
            subsections: node
                .children
                .iter()
                .map(|&child| self.materialize(child))
                .collect(),
        }
    }
}
