use scraper::{ElementRef, Html, Node};

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript", "svg"];

/// Elements that only group blocks; text directly inside them is flushed as
/// its own block at their boundaries.
const CONTAINER_TAGS: &[&str] = &[
    "html", "body", "div", "section", "article", "main", "header", "footer", "aside", "figure",
    "form", "details", "center",
];

/// Elements that start a new line when they appear inside a recorded block.
const LINE_TAGS: &[&str] = &[
    "p", "div", "tr", "blockquote", "pre", "ul", "ol", "dl", "dt", "dd", "table", "h1", "h2",
    "h3", "h4", "h5", "h6", "section", "article", "figure", "figcaption",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Heading { level: u8, text: String },
    Block { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    ListItem,
    Preformatted,
}

/// Flattens an HTML document into heading and block nodes in reading order.
pub fn html_nodes(html: &str) -> Vec<HtmlNode> {
    let document = Html::parse_document(html);
    let mut collector = NodeCollector::default();
    collector.walk(document.root_element());
    collector.flush_loose();
    collector.nodes
}

#[derive(Debug, Default)]
struct NodeCollector {
    nodes: Vec<HtmlNode>,
    loose: String,
}

impl NodeCollector {
    fn walk(&mut self, parent: ElementRef<'_>) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => self.loose.push_str(text),
                Node::Element(_) => {
                    if let Some(element) = ElementRef::wrap(child) {
                        self.visit(element);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if SKIPPED_TAGS.contains(&tag) {
            return;
        }
        if tag == "br" {
            self.loose.push('\n');
            return;
        }

        if let Some(kind) = block_kind(tag) {
            self.flush_loose();
            self.maybe_record(kind, element);
        } else if CONTAINER_TAGS.contains(&tag) || contains_block(element) {
            self.flush_loose();
            self.walk(element);
            self.flush_loose();
        } else {
            append_text(element, &mut self.loose);
        }
    }

    fn maybe_record(&mut self, kind: BlockKind, element: ElementRef<'_>) {
        let text = extract_text(element, kind);
        if text.is_empty() {
            return;
        }

        match kind {
            BlockKind::Heading { level } => self.nodes.push(HtmlNode::Heading { level, text }),
            _ => self.nodes.push(HtmlNode::Block { text }),
        }
    }

    fn flush_loose(&mut self) {
        let text = normalize_lines(&self.loose);
        self.loose.clear();
        if !text.is_empty() {
            self.nodes.push(HtmlNode::Block { text });
        }
    }
}

fn block_kind(tag: &str) -> Option<BlockKind> {
    match tag {
        "h1" => Some(BlockKind::Heading { level: 1 }),
        "h2" => Some(BlockKind::Heading { level: 2 }),
        "h3" => Some(BlockKind::Heading { level: 3 }),
        "h4" => Some(BlockKind::Heading { level: 4 }),
        "h5" => Some(BlockKind::Heading { level: 5 }),
        "h6" => Some(BlockKind::Heading { level: 6 }),
        "p" | "blockquote" | "ul" | "ol" | "dl" | "table" => Some(BlockKind::Paragraph),
        "li" => Some(BlockKind::ListItem),
        "pre" => Some(BlockKind::Preformatted),
        _ => None,
    }
}

fn contains_block(element: ElementRef<'_>) -> bool {
    element
        .descendent_elements()
        .any(|descendant| block_kind(descendant.value().name()).is_some())
}

fn extract_text(element: ElementRef<'_>, kind: BlockKind) -> String {
    let mut raw = String::new();
    if kind == BlockKind::ListItem {
        raw.push_str("- ");
    }
    append_text(element, &mut raw);

    match kind {
        // Headings keep a single line.
        BlockKind::Heading { .. } => collapse_whitespace(&raw),
        BlockKind::Preformatted => raw
            .lines()
            .map(str::trim_end)
            .collect::<Vec<&str>>()
            .join("\n")
            .trim_matches('\n')
            .to_string(),
        BlockKind::Paragraph | BlockKind::ListItem => normalize_lines(&raw),
    }
}

/// Visible text of an element; list items become `- ` lines and table cells
/// are separated by ` | `.
fn append_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let tag = child.value().name();
                if SKIPPED_TAGS.contains(&tag) {
                    continue;
                }
                match tag {
                    "br" => out.push('\n'),
                    "li" => {
                        out.push_str("\n- ");
                        append_text(child, out);
                        out.push('\n');
                    }
                    "td" | "th" => {
                        append_text(child, out);
                        out.push_str(" | ");
                    }
                    _ if LINE_TAGS.contains(&tag) => {
                        out.push('\n');
                        append_text(child, out);
                        out.push('\n');
                    }
                    _ => append_text(child, out),
                }
            }
            _ => {}
        }
    }
}

fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(collapse_whitespace)
        .map(|line| line.trim_end_matches('|').trim().to_string())
        .filter(|line| !line.is_empty() && line != "-")
        .collect::<Vec<String>>()
        .join("\n")
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}
