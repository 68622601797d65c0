//-
// Copyright (c) 2024, Mailsort contributors
//
// This file is part of Mailsort.
//
// Mailsort is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mailsort is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailsort. If not, see <http://www.gnu.org/licenses/>.

/// Determine whether the given maildir name is "safe".
///
/// A maildir name is a path relative to the base directory. The empty string
/// names the base directory itself, and Maildir++ style folders such as
/// `.Lists.rust` are normal, so leading dots are fine. What is excluded is
/// anything that would escape the base directory or land inside another
/// maildir's `cur`/`new`/`tmp`.
pub fn is_safe_maildir_name(name: &str) -> bool {
    // Absolute paths would ignore the base directory entirely
    !name.starts_with('/') &&
        // No traversal through ..
        name.split('/').all(|c| c != ".." && c != ".") &&
        // Reject empty components ("a//b", trailing "/") except for the
        // empty name as a whole
        (name.is_empty() || name.split('/').all(|c| !c.is_empty())) &&
        // Don't allow the name to point inside some maildir's subdirectories
        name.split('/').all(|c| c != "cur" && c != "new" && c != "tmp") &&
        // Don't allow any ASCII control characters
        name.find(|c| c < ' ' || c == '\x7F').is_none()
}
