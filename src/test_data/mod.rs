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

/// An ordinary person-to-person message with DOS line endings.
pub static SIMPLE: &[u8] = b"Return-Path: <alice@example.com>\r\n\
From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>\r\n\
Subject: Lunch on Friday?\r\n\
Date: Tue, 3 Mar 2020 12:34:56 +0100\r\n\
Message-ID: <20200303123456.1234@example.com>\r\n\
\r\n\
Hi Bob,\r\n\
\r\n\
Are you free for lunch on Friday?\r\n\
Subject: this is body text, not a header\r\n";

/// A message from a mailing list, with UNIX line endings and a header that
/// occurs twice.
pub static MAILING_LIST: &[u8] = b"Delivered-To: Mailing list rust-users@example.org\n\
Delivered-To: user@example.com\n\
From: Carol <carol@example.net>\n\
To: rust-users@example.org\n\
Cc: bob@example.com\n\
Subject: [rust-users] Borrow checker question\n\
List-Id: <rust-users.example.org>\n\
X-BeenThere: rust-users@example.org\n\
\n\
Why does this not compile?\n";

/// Headers using RFC 2047 encoded words, including a folded one.
pub static ENCODED: &[u8] = b"From: =?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?= <keld@example.dk>\r\n\
To: user@example.com\r\n\
Subject: =?utf-8?q?Gr=C3=BC=C3=9Fe?= aus\r\n\
\x20=?utf-8?b?S8O2bG4=?=\r\n\
\r\n\
Hallo!\r\n";

/// Headers that can't all be decoded.
pub static BROKEN_ENCODING: &[u8] = b"Subject: =?x-unknown?q?secret?= stuff\n\
X-Other: fine\n\
X-Latin1: \xe9t\xe9\n\
\n\
body\n";
