//! Download URL list and push payload.

use std::net::{IpAddr, SocketAddr};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything but ASCII alphanumerics and `-._~` is escaped, so a name can
/// never break the newline-delimited payload.
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes one file name for use as a URL path segment.
pub fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, FILE_NAME).to_string()
}

/// Builds `http://<host>:<port>/<encoded name>` for every name, in order.
pub fn build_urls<S: AsRef<str>>(host: IpAddr, port: u16, names: &[S]) -> Vec<String> {
    let authority = SocketAddr::new(host, port);
    names
        .iter()
        .map(|name| format!("http://{authority}/{}", encode_file_name(name.as_ref())))
        .collect()
}

/// Joins the URL list with `\n` into the bytes sent to the receiver.
pub fn push_payload<S: AsRef<str>>(urls: &[S]) -> Vec<u8> {
    urls.iter()
        .map(|u| u.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}
