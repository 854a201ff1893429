//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Filterctl.
//
// Filterctl is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Filterctl is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Filterctl. If not, see <http://www.gnu.org/licenses/>.

//! RFC 5322 address and RFC 2045 content-type syntax.
//!
//! The grammar includes the RFC 2822 "obsolete" forms since real forwarded
//! mail is full of them.

use std::borrow::Cow;

use nom::branch::alt;
use nom::bytes::complete::{is_a, is_not, take, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, opt};
use nom::multi::{
    many0, many0_count, many1_count, separated_nonempty_list,
};
use nom::sequence::{
    delimited, pair, preceded, separated_pair, terminated, tuple,
};
use nom::IResult;

use super::model::*;

// RFC 2822 3.2.2 "quoted-pair", including the 8-bit clean obsolete syntax
fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 2822 3.2.3 "Folding white space". Headers are unfolded before they get
// here, so line endings are just more whitespace.
fn fws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

fn ctext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not("()\\ \t\r\n")(i)
}

fn ccontent(i: &[u8]) -> IResult<&[u8], ()> {
    alt((
        map(ctext, |_| ()),
        map(quoted_pair, |_| ()),
        map(fws, |_| ()),
        comment,
    ))(i)
}

// Comments nest.
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        delimited(char('('), many0_count(ccontent), char(')')),
        |_| (),
    )(i)
}

fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many1_count(alt((map(fws, |_| ()), comment))), |_| ())(i)
}

// RFC 2822 3.2.4 "atext", amended by RFC 6532 to include all non-ASCII
fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
        || ch >= 0x80
}

fn atom(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(opt(cfws), take_while1(is_atext), opt(cfws))(i)
}

fn qtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not(" \t\r\n\\\"")(i)
}

fn qcontent(i: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((qtext, quoted_pair, fws))(i)
}

fn quoted_string(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    map(
        delimited(
            pair(opt(cfws), char('"')),
            many0(qcontent),
            pair(char('"'), opt(cfws)),
        ),
        |pieces: Vec<&[u8]>| Cow::Owned(pieces.concat()),
    )(i)
}

fn word(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    alt((map(atom, Cow::Borrowed), quoted_string))(i)
}

// The bare '.' permitted in obsolete phrases ("J. Random Hacker")
fn obs_dot(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    terminated(map(char('.'), |_| Cow::Borrowed(&b"."[..])), opt(cfws))(i)
}

fn phrase(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    map(pair(word, many0(alt((word, obs_dot)))), |(head, mut tail)| {
        tail.insert(0, head);
        tail
    })(i)
}

// Covers dot-atom, quoted-string, and obs-local-part.
fn local_part(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    separated_nonempty_list(char('.'), word)(i)
}

fn obs_domain(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    separated_nonempty_list(char('.'), map(atom, Cow::Borrowed))(i)
}

fn dtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not("[]\\ \t\r\n")(i)
}

fn domain_literal(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    map(
        delimited(
            pair(opt(cfws), char('[')),
            many0(alt((dtext, quoted_pair, fws))),
            pair(char(']'), opt(cfws)),
        ),
        |pieces: Vec<&[u8]>| {
            let mut literal = vec![b'['];
            literal.extend(pieces.concat());
            literal.push(b']');
            Cow::Owned(literal)
        },
    )(i)
}

fn domain(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    alt((obs_domain, map(domain_literal, |d| vec![d])))(i)
}

fn addr_spec(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    map(
        separated_pair(local_part, char('@'), domain),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 2822 4.4 source route ("<@a,@b:user@c>"), discarded
fn obs_route(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        tuple((
            char('@'),
            domain,
            many0_count(tuple((
                many0_count(alt((cfws, map(char(','), |_| ())))),
                char('@'),
                domain,
            ))),
            char(':'),
        )),
        |_| (),
    )(i)
}

fn angle_addr(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    delimited(
        tuple((opt(cfws), char('<'), opt(obs_route))),
        addr_spec,
        pair(char('>'), opt(cfws)),
    )(i)
}

fn mailbox(i: &[u8]) -> IResult<&[u8], MailboxSpec> {
    alt((
        map(pair(opt(phrase), angle_addr), |(name, addr)| MailboxSpec {
            name: name.unwrap_or_default(),
            addr,
        }),
        map(addr_spec, |addr| MailboxSpec { name: vec![], addr }),
    ))(i)
}

// Obsolete syntax allows empty list elements.
fn list_delim(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        many1_count(tuple((opt(cfws), char(','), opt(cfws)))),
        |_| (),
    )(i)
}

fn mailbox_list(i: &[u8]) -> IResult<&[u8], Vec<MailboxSpec>> {
    delimited(
        opt(list_delim),
        separated_nonempty_list(list_delim, mailbox),
        opt(list_delim),
    )(i)
}

fn group(i: &[u8]) -> IResult<&[u8], GroupSpec> {
    map(
        pair(
            terminated(phrase, char(':')),
            terminated(
                opt(mailbox_list),
                tuple((opt(cfws), char(';'), opt(cfws))),
            ),
        ),
        |(name, boxes)| GroupSpec {
            name,
            boxes: boxes.unwrap_or_default(),
        },
    )(i)
}

fn address(i: &[u8]) -> IResult<&[u8], Address> {
    alt((map(mailbox, Address::Mailbox), map(group, Address::Group)))(i)
}

fn address_list(i: &[u8]) -> IResult<&[u8], Vec<Address>> {
    delimited(
        opt(list_delim),
        separated_nonempty_list(list_delim, address),
        opt(list_delim),
    )(i)
}

/// Parse an entire address-list header value (`To`, `Cc`, ...).
pub fn parse_address_list(value: &[u8]) -> Option<Vec<Address>> {
    all_consuming(delimited(opt(cfws), address_list, opt(cfws)))(value)
        .ok()
        .map(|(_, list)| list)
}

/// Parse an address-list header value into the mailboxes it names.
///
/// Group members are included in place of their groups, so an empty group
/// contributes nothing.
pub fn parse_mailboxes(value: &[u8]) -> Option<Vec<Mailbox>> {
    let list = parse_address_list(value)?;
    let mut boxes = Vec::new();
    for address in &list {
        match *address {
            Address::Mailbox(ref m) => boxes.push(Mailbox::from(m)),
            Address::Group(ref g) => {
                boxes.extend(g.boxes.iter().map(Mailbox::from))
            },
        }
    }
    Some(boxes)
}

/// Parse a value that must hold exactly one mailbox.
pub fn parse_single_mailbox(value: &[u8]) -> Option<Mailbox> {
    all_consuming(delimited(opt(cfws), mailbox, opt(cfws)))(value)
        .ok()
        .map(|(_, m)| Mailbox::from(&m))
}

// RFC 2045 5.1 token
fn is_token(ch: u8) -> bool {
    ch > b' ' && ch < 0x7F && !b"()<>@,;:\\\"/[]?=".contains(&ch)
}

fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(opt(cfws), take_while1(is_token), opt(cfws))(i)
}

fn parameter(i: &[u8]) -> IResult<&[u8], (&[u8], Cow<[u8]>)> {
    separated_pair(
        token,
        char('='),
        alt((map(token, Cow::Borrowed), quoted_string)),
    )(i)
}

fn content_type(
    i: &[u8],
) -> IResult<&[u8], (&[u8], &[u8], Vec<(&[u8], Cow<[u8]>)>)> {
    tuple((
        token,
        preceded(char('/'), token),
        terminated(
            many0(preceded(char(';'), parameter)),
            // Trailing semicolons are common and harmless
            many0_count(pair(char(';'), opt(cfws))),
        ),
    ))(i)
}

/// Parse a `Content-Type` header value.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    let (_, (typ, subtype, parms)) =
        all_consuming(delimited(opt(cfws), content_type, opt(cfws)))(value)
            .ok()?;

    let lower = |s: &[u8]| String::from_utf8_lossy(s).to_ascii_lowercase();
    Some(ContentType {
        typ: lower(typ),
        subtype: lower(subtype),
        parms: parms
            .into_iter()
            .map(|(name, value)| {
                (lower(name), String::from_utf8_lossy(&value).into_owned())
            })
            .collect(),
    })
}

/// Normalise a `Content-Transfer-Encoding` header value.
pub fn parse_transfer_encoding(value: &[u8]) -> Option<String> {
    all_consuming(delimited(opt(cfws), token, opt(cfws)))(value)
        .ok()
        .map(|(_, t)| String::from_utf8_lossy(t).to_ascii_lowercase())
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn single(value: &str) -> Mailbox {
        parse_single_mailbox(value.as_bytes())
            .unwrap_or_else(|| panic!("failed to parse {:?}", value))
    }

    #[test]
    fn simple_mailboxes() {
        let m = single("alice@example.com");
        assert_eq!(None, m.display_name);
        assert_eq!("alice", m.local);
        assert_eq!("example.com", m.domain);

        let m = single("Alice Example <alice@Example.COM>");
        assert_eq!(Some("Alice Example".to_owned()), m.display_name);
        assert_eq!("alice@example.com", m.address());

        let m = single("\"Example, Alice\" <alice@example.com>");
        assert_eq!(Some("Example, Alice".to_owned()), m.display_name);

        let m = single("  <alice@example.com>  ");
        assert_eq!(None, m.display_name);
        assert_eq!("alice@example.com", m.address());
    }

    #[test]
    fn obsolete_forms() {
        let m = single("J. Random Hacker <jrh@example.com>");
        assert_eq!(Some("J. Random Hacker".to_owned()), m.display_name);

        let m =
            single("<@relay.example.net,@other.example.net:bob@example.com>");
        assert_eq!("bob@example.com", m.address());

        let m = single("bob (Bob Smith) @ example . com");
        assert_eq!("bob@example.com", m.address());

        let m = single("\"odd local\"@example.com");
        assert_eq!("odd local", m.local);

        let m = single("ops@[192.0.2.1]");
        assert_eq!("[192.0.2.1]", m.domain);
    }

    #[test]
    fn encoded_display_name() {
        let m = single("=?UTF-8?Q?Zo=C3=AB?= <zoe@example.com>");
        assert_eq!(Some("Zoë".to_owned()), m.display_name);
    }

    #[test]
    fn address_lists() {
        let boxes = parse_mailboxes(
            b"alice@example.com, Bob <bob@example.com>,, \
              Friends: carol@example.com, dave@example.com;",
        )
        .unwrap();
        assert_eq!(
            vec![
                "alice@example.com",
                "bob@example.com",
                "carol@example.com",
                "dave@example.com",
            ],
            boxes.iter().map(Mailbox::address).collect::<Vec<_>>()
        );

        assert_eq!(
            Some(vec![]),
            parse_mailboxes(b"undisclosed-recipients:;")
        );
    }

    #[test]
    fn malformed_addresses() {
        assert_eq!(None, parse_single_mailbox(b""));
        assert_eq!(None, parse_single_mailbox(b"not an address"));
        assert_eq!(None, parse_single_mailbox(b"a@example.com, b@example.com"));
        assert_eq!(None, parse_single_mailbox(b"<unterminated@example.com"));
        assert_eq!(None, parse_mailboxes(b"@"));
    }

    #[test]
    fn content_types() {
        let ct = parse_content_type(b"Text/Plain; charset=\"UTF-8\"").unwrap();
        assert!(ct.is("text", "plain"));
        assert_eq!(Some("UTF-8"), ct.parm("charset"));

        let ct = parse_content_type(
            b"multipart/mixed;\r\n boundary=\"----=_Part_0_1.2\";",
        )
        .unwrap();
        assert!(ct.is("multipart", "mixed"));
        assert_eq!(Some("----=_Part_0_1.2"), ct.parm("boundary"));

        let ct = parse_content_type(b"message/rfc822").unwrap();
        assert!(ct.is_type("message"));
        assert!(ct.parms.is_empty());

        assert_eq!(None, parse_content_type(b"text"));
        assert_eq!(None, parse_content_type(b"text/plain; charset"));
    }

    #[test]
    fn transfer_encodings() {
        assert_eq!(
            Some("base64".to_owned()),
            parse_transfer_encoding(b" Base64 ")
        );
        assert_eq!(None, parse_transfer_encoding(b""));
    }

    proptest! {
        #[test]
        fn address_parsing_never_panics(s in r"[ -~]{0,64}") {
            parse_mailboxes(s.as_bytes());
            parse_single_mailbox(s.as_bytes());
        }

        #[test]
        fn content_type_parsing_never_panics(s in r"[ -~]{0,64}") {
            parse_content_type(s.as_bytes());
        }
    }
}
