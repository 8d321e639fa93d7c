/// 以標籤節點表示的狀態樹。 / Labeled node used as the serialized form of component state.
///
/// Attributes and children keep their insertion order so that a document
/// written twice from the same state is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateTree {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<StateTree>,
    text: Option<String>,
}

impl StateTree {
    /// 建立指定名稱的空節點。 / Creates an empty node with the given label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// 以鏈式方式附加屬性。 / Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// 以鏈式方式附加子節點。 / Builder-style child append.
    pub fn with_child(mut self, child: StateTree) -> Self {
        self.children.push(child);
        self
    }

    /// 以鏈式方式設定文字內容。 / Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// 讀取屬性值。 / Returns the value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// 設定屬性；已存在時原地覆寫以保留順序。 / Sets an attribute, overwriting in place to keep ordering.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// 移除屬性並回傳舊值。 / Removes an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Empty text is stored as no text, matching what the parser produces.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.text = if text.is_empty() { None } else { Some(text) };
    }

    pub(crate) fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    pub fn children(&self) -> &[StateTree] {
        &self.children
    }

    pub fn add_child(&mut self, child: StateTree) {
        self.children.push(child);
    }

    /// 第一個符合名稱的子節點。 / First child carrying the given label.
    pub fn child(&self, name: &str) -> Option<&StateTree> {
        self.children.iter().find(|child| child.name == name)
    }

    /// 依名稱與屬性值尋找子節點。 / First child with the given label and attribute value.
    pub fn child_with(&self, name: &str, attribute: &str, value: &str) -> Option<&StateTree> {
        self.children
            .iter()
            .find(|child| child.name == name && child.attribute(attribute) == Some(value))
    }

    /// 列舉符合名稱的所有子節點。 / Iterates over children carrying the given label.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a StateTree> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn children_mut(&mut self) -> &mut Vec<StateTree> {
        &mut self.children
    }

    /// 移除所有符合條件的子節點，回傳移除數量。 / Removes every matching child, returning how many were dropped.
    pub fn remove_children<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&StateTree) -> bool,
    {
        let before = self.children.len();
        self.children.retain(|child| !predicate(child));
        before - self.children.len()
    }

    /// 沒有屬性、子節點與文字時視為空。 / A node without attributes, children or text is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.children.is_empty()
            && self.text.as_deref().map_or(true, str::is_empty)
    }

    /// 將另一個節點的內容併入本節點。 / Moves the content (attributes, children, text) of `other` into `self`.
    pub(crate) fn absorb(&mut self, other: StateTree) {
        for (key, value) in other.attributes {
            self.set_attribute(key, value);
        }
        self.children.extend(other.children);
        if let Some(text) = other.text {
            self.append_text(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_keep_insertion_order_on_overwrite() {
        let mut node = StateTree::new("component")
            .with_attribute("name", "Foo")
            .with_attribute("count", "1");
        node.set_attribute("name", "Bar");

        let collected: Vec<_> = node.attributes().collect();
        assert_eq!(collected, vec![("name", "Bar"), ("count", "1")]);
        assert_eq!(node.remove_attribute("count").as_deref(), Some("1"));
        assert_eq!(node.attribute("count"), None);
    }

    #[test]
    fn child_lookup_by_attribute() {
        let node = StateTree::new("application")
            .with_child(StateTree::new("component").with_attribute("name", "A"))
            .with_child(StateTree::new("component").with_attribute("name", "B"));

        let found = node.child_with("component", "name", "B").unwrap();
        assert_eq!(found.attribute("name"), Some("B"));
        assert_eq!(node.children_named("component").count(), 2);
    }

    #[test]
    fn emptiness_ignores_blank_text() {
        let mut node = StateTree::new("x").with_text("");
        assert!(node.is_empty());
        node.add_child(StateTree::new("y"));
        assert!(!node.is_empty());
        assert_eq!(node.remove_children(|child| child.name() == "y"), 1);
        assert!(node.is_empty());
    }

    #[test]
    fn empty_text_is_stored_as_none() {
        let mut node = StateTree::new("title").with_text("");
        assert_eq!(node.text(), None);
        assert_eq!(node, StateTree::new("title"));

        node.set_text("   ");
        assert_eq!(node.text(), Some("   "));
        node.set_text(String::new());
        assert_eq!(node.text(), None);
    }
}
