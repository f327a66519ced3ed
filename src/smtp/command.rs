//! SMTP command line parsing.

use crate::error::{Error, Result};

/// A parsed SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    /// `MAIL FROM:<path>`. The null reverse path is an empty string.
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Vrfy(String),
    Quit,
}

impl SmtpCommand {
    /// Parse one command line, with or without its CRLF terminator.
    ///
    /// Unknown verbs fail with [`Error::UnknownCommand`]; malformed
    /// arguments fail with [`Error::Syntax`].
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, args) = line
            .split_once(' ')
            .map_or((line, ""), |(verb, args)| (verb, args.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Self::Helo(domain(args)?)),
            "EHLO" => Ok(Self::Ehlo(domain(args)?)),
            "MAIL" => {
                let path = strip_keyword(args, "FROM:")?;
                parse_path(path, true).map(Self::MailFrom)
            }
            "RCPT" => {
                let path = strip_keyword(args, "TO:")?;
                parse_path(path, false).map(Self::RcptTo)
            }
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "NOOP" => Ok(Self::Noop),
            "VRFY" => Ok(Self::Vrfy(args.to_string())),
            "QUIT" => Ok(Self::Quit),
            _ => Err(Error::UnknownCommand(verb.to_string())),
        }
    }
}

fn domain(args: &str) -> Result<String> {
    args.split_whitespace()
        .next()
        .map(ToString::to_string)
        .ok_or_else(|| Error::Syntax("Domain name required".to_string()))
}

fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Result<&'a str> {
    match args.get(..keyword.len()) {
        Some(head) if head.eq_ignore_ascii_case(keyword) => Ok(args[keyword.len()..].trim_start()),
        _ => Err(Error::Syntax(format!("Expected {keyword}<address>"))),
    }
}

/// Extract the address between `<` and `>`. Anything after the closing
/// bracket is an ESMTP parameter and is ignored.
fn parse_path(path: &str, allow_null: bool) -> Result<String> {
    let inner = path
        .strip_prefix('<')
        .and_then(|rest| rest.split_once('>'))
        .map(|(inner, _params)| inner)
        .ok_or_else(|| Error::Syntax(format!("Malformed path {path}")))?;

    if inner.is_empty() {
        return if allow_null {
            Ok(String::new())
        } else {
            Err(Error::Syntax("Recipient address required".to_string()))
        };
    }

    // Drop a source route such as `@relay:user@host`.
    let address = inner.rsplit_once(':').map_or(inner, |(_, addr)| addr);
    validate_address(address)?;
    Ok(address.to_string())
}

/// Check the shape `local@domain` without attempting full RFC 5321
/// validation.
pub fn validate_address(address: &str) -> Result<()> {
    let (local, domain) = address
        .rsplit_once('@')
        .ok_or_else(|| Error::Syntax(format!("Address {address} has no domain")))?;

    let bad_char = |c: char| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',');
    if local.is_empty() || local.chars().any(bad_char) {
        return Err(Error::Syntax(format!("Invalid local part in {address}")));
    }
    if domain.is_empty()
        || domain.starts_with('.')
        || domain.ends_with('.')
        || !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '[' | ']' | ':'))
    {
        return Err(Error::Syntax(format!("Invalid domain in {address}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_envelope_commands() {
        assert_eq!(
            SmtpCommand::parse("HELO test\r\n").unwrap(),
            SmtpCommand::Helo("test".to_string())
        );
        assert_eq!(
            SmtpCommand::parse("MAIL FROM:<foo@bar.com>").unwrap(),
            SmtpCommand::MailFrom("foo@bar.com".to_string())
        );
        assert_eq!(
            SmtpCommand::parse("rcpt to: <foo2@bar.com>").unwrap(),
            SmtpCommand::RcptTo("foo2@bar.com".to_string())
        );
        assert_eq!(SmtpCommand::parse("data").unwrap(), SmtpCommand::Data);
        assert_eq!(SmtpCommand::parse("QUIT\r\n").unwrap(), SmtpCommand::Quit);
    }

    #[test]
    fn accepts_null_sender_and_esmtp_params() {
        assert_eq!(
            SmtpCommand::parse("MAIL FROM:<>").unwrap(),
            SmtpCommand::MailFrom(String::new())
        );
        assert_eq!(
            SmtpCommand::parse("MAIL FROM:<a@b.com> SIZE=1024 BODY=8BITMIME").unwrap(),
            SmtpCommand::MailFrom("a@b.com".to_string())
        );
    }

    #[test]
    fn strips_source_route() {
        assert_eq!(
            SmtpCommand::parse("RCPT TO:<@relay.org:user@host.org>").unwrap(),
            SmtpCommand::RcptTo("user@host.org".to_string())
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        for line in [
            "MAIL FROM:foo@bar.com",
            "MAIL FROM:<foo>",
            "MAIL FROM:<@bar.com>",
            "MAIL FROM:<foo@>",
            "RCPT TO:<>",
            "RCPT TO:<a b@c.com>",
            "MAIL <a@b.com>",
        ] {
            assert!(
                matches!(SmtpCommand::parse(line), Err(Error::Syntax(_))),
                "{line} should be rejected"
            );
        }
    }

    #[test]
    fn helo_requires_domain() {
        assert!(matches!(SmtpCommand::parse("HELO"), Err(Error::Syntax(_))));
    }

    #[test]
    fn unknown_verb_is_unrecognized() {
        let Err(Error::UnknownCommand(verb)) = SmtpCommand::parse("TURN now") else {
            panic!("expected unknown command");
        };
        assert_eq!(verb, "TURN");
        // A verb whose text happens to read "unrecognized" is still just unknown.
        assert!(matches!(
            SmtpCommand::parse("unrecognized"),
            Err(Error::UnknownCommand(_))
        ));
    }
}
