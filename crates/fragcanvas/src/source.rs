/// One child of a canvas element, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    /// Inline character data.
    Text(String),
    /// Embedded script block holding shader text.
    Script(String),
    /// Anything else; contributes nothing.
    Other,
}

/// Extracts the shader text carried by an element's children.
///
/// Text nodes are concatenated in order. The first script block replaces
/// whatever was accumulated and ends the scan. The result is trimmed.
pub fn shader_source<'a, I>(nodes: I) -> String
where
    I: IntoIterator<Item = &'a ContentNode>,
{
    let mut source = String::new();
    for node in nodes {
        match node {
            ContentNode::Text(text) => source.push_str(text),
            ContentNode::Script(text) => {
                source.clear();
                source.push_str(text);
                break;
            }
            ContentNode::Other => {}
        }
    }
    source.trim().to_owned()
}
