// https://github.com/softprops/treeline/blob/eaaa03a5fac200fb5255c8aa927de43e7974745f/src/lib.rs
// Original work Copyright (c) 2015-2016 Doug Tangren
// Modified work Copyright (c) 2019 Cole Helbling
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE
// LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION
// WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::fmt;

use termion::color;
use termion::style;

use crate::path::SEPARATOR;

const EDGE: &str = "├── ";
const LINE: &str = "│   ";
const CORNER: &str = "└── ";
const BLANK: &str = "    ";

/// Entry paths arranged by directory. Nodes with children are drawn as
/// directories, the rest as entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub name: String,
    pub tree: Vec<Tree>,
    /// Whether directory names are drawn in bold blue.
    pub color: bool,
}

impl Tree {
    pub fn new<S>(name: S) -> Tree
    where
        S: Into<String>,
    {
        Tree {
            name: name.into(),
            tree: Vec::new(),
            color: false,
        }
    }

    /// Builds a tree under `name` from canonical entry paths.
    pub fn from_paths<I, S>(name: &str, paths: I) -> Tree
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Tree::new(name);
        for path in paths {
            root.insert(path.as_ref().split(SEPARATOR).filter(|s| !s.is_empty()));
        }
        root.sort();

        root
    }

    pub fn with_color(mut self, color: bool) -> Tree {
        self.color = color;
        self
    }

    fn insert<'a, I>(&mut self, mut segments: I)
    where
        I: Iterator<Item = &'a str>,
    {
        let segment = match segments.next() {
            Some(segment) => segment,
            None => return,
        };

        let i = match self.tree.iter().position(|t| t.name == segment) {
            Some(i) => i,
            None => {
                self.tree.push(Tree::new(segment));
                self.tree.len() - 1
            }
        };
        self.tree[i].insert(segments);
    }

    fn sort(&mut self) {
        self.tree.sort_by(|a, b| a.name.cmp(&b.name));
        self.tree.iter_mut().for_each(Tree::sort);
    }

    fn is_dir(&self) -> bool {
        !self.tree.is_empty()
    }

    fn write_name(&self, f: &mut fmt::Formatter, colored: bool) -> fmt::Result {
        if colored && self.is_dir() {
            write!(
                f,
                "{blue}{bold}{}{reset}",
                self.name,
                bold = style::Bold,
                blue = color::Fg(color::Blue),
                reset = style::Reset
            )
        } else {
            write!(f, "{}", self.name)
        }
    }

    fn draw_tree(&self, f: &mut fmt::Formatter, prefix: &mut Vec<bool>, colored: bool) -> fmt::Result {
        for (i, leaf) in self.tree.iter().enumerate() {
            let last = i + 1 == self.tree.len();

            for blank in prefix.iter() {
                f.write_str(if *blank { BLANK } else { LINE })?;
            }
            f.write_str(if last { CORNER } else { EDGE })?;
            leaf.write_name(f, colored)?;
            writeln!(f)?;

            if leaf.is_dir() {
                prefix.push(last);
                leaf.draw_tree(f, prefix, colored)?;
                prefix.pop();
            }
        }

        Ok(())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_name(f, self.color)?;
        writeln!(f)?;

        self.draw_tree(f, &mut Vec::new(), self.color)
    }
}
