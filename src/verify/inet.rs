//! IPv4 address extraction from `ip addr` output

use crate::testbed::TestClient;

use super::VerifyError;

/// Marker preceding the address in `ip -4 addr` output
pub const INET_MARKER: &str = "inet ";

/// Extract the address following the first `inet ` marker
///
/// Takes everything between the marker and the next `/` verbatim, so
/// `"inet 10.0.0.5/24 brd ..."` yields `"10.0.0.5"`. Nothing is trimmed.
pub fn extract_inet_address(output: &str) -> Option<&str> {
    let start = output.find(INET_MARKER)? + INET_MARKER.len();
    let rest = &output[start..];
    let end = rest.find('/')?;
    let address = &rest[..end];
    (!address.is_empty()).then_some(address)
}

/// Shell command listing the IPv4 addresses of `iface`
pub fn inet_query_command(iface: &str) -> String {
    format!("ip -4 addr show dev {iface} | grep \"{INET_MARKER}\"")
}

/// Read the client's IPv4 address as the client itself sees it
///
/// Fails with [`VerifyError::SourceUnavailable`] when the command fails or
/// the interface has no address.
pub async fn client_ipv4(client: &dyn TestClient) -> Result<String, VerifyError> {
    let output = client
        .run(&inet_query_command(client.iface()))
        .await
        .map_err(|e| VerifyError::source_unavailable(client.name(), e))?;

    extract_inet_address(&output)
        .map(str::to_string)
        .ok_or_else(|| {
            VerifyError::source_unavailable(
                client.name(),
                format!("no IPv4 address on {}", client.iface()),
            )
        })
}
