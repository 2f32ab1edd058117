//! Solidity interfaces of the identity-token and research-results contracts.

use alloy_primitives::{B256, U256};

alloy_sol_types::sol! {
    interface IIdentityToken {
        event AccessGranted(uint256 indexed tokenId, address indexed agentAddress, bytes32 indexed dataTypeHash);
        event AccessRevoked(uint256 indexed tokenId, address indexed agentAddress, bytes32 indexed dataTypeHash);

        function mint(address to, uint256 tokenId, string uri) external;
        function grantAccess(uint256 tokenId, address agentAddress, bytes32 dataTypeHash) external;
        function revokeAccess(uint256 tokenId, address agentAddress, bytes32 dataTypeHash) external;
        function hasAccess(uint256 tokenId, address agentAddress, bytes32 dataTypeHash) external view returns (bool);
    }

    interface IResearchResults {
        event ResearchResultSubmitted(string indexed researchTopic, bytes32 indexed resultHash, uint256 accuracy, address indexed agentAddress);

        function submitAggregatedResult(string researchTopic, bytes32 resultHash, uint256 accuracy, address agentAddress) external;
        function getResearchResult(string researchTopic, address agentAddress) external view returns (bytes32 resultHash, uint256 accuracy);
    }
}

const WORD: usize = 32;

fn word(data: &[u8], index: usize) -> Result<&[u8], String> {
    let start = index * WORD;
    data.get(start..start + WORD).ok_or_else(|| {
        format!(
            "expected at least {} bytes of return data, got {}",
            start + WORD,
            data.len()
        )
    })
}

/// Decode a single ABI `bool` return value.
pub fn decode_bool(data: &[u8]) -> Result<bool, String> {
    let word = word(data, 0)?;
    if word[..WORD - 1].iter().any(|b| *b != 0) || word[WORD - 1] > 1 {
        return Err("bool word is not 0 or 1".to_string());
    }
    Ok(word[WORD - 1] == 1)
}

/// Decode a `(bytes32, uint256)` return tuple.
pub fn decode_hash_and_uint(data: &[u8]) -> Result<(B256, U256), String> {
    let hash = B256::from_slice(word(data, 0)?);
    let value = U256::from_be_slice(word(data, 1)?);
    Ok((hash, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, keccak256};
    use alloy_sol_types::SolCall;

    #[test]
    fn selectors_match_signatures() {
        assert_eq!(
            IIdentityToken::mintCall::SELECTOR,
            keccak256("mint(address,uint256,string)")[..4]
        );
        assert_eq!(
            IIdentityToken::grantAccessCall::SELECTOR,
            keccak256("grantAccess(uint256,address,bytes32)")[..4]
        );
        assert_eq!(
            IResearchResults::getResearchResultCall::SELECTOR,
            keccak256("getResearchResult(string,address)")[..4]
        );
    }

    #[test]
    fn grant_access_calldata_layout() {
        let data_type = keccak256("genomic");
        let call = IIdentityToken::grantAccessCall {
            tokenId: U256::from(42u64),
            agentAddress: Address::repeat_byte(0x11),
            dataTypeHash: data_type,
        };
        let encoded = call.abi_encode();
        assert_eq!(encoded.len(), 4 + 3 * 32);
        assert_eq!(&encoded[..4], IIdentityToken::grantAccessCall::SELECTOR.as_slice());
        assert_eq!(encoded[4 + 31], 42);
        assert_eq!(&encoded[4 + 64..], data_type.as_slice());
    }

    #[test]
    fn decodes_bool_words() {
        let mut data = vec![0u8; 32];
        assert!(!decode_bool(&data).expect("false"));
        data[31] = 1;
        assert!(decode_bool(&data).expect("true"));
        data[31] = 2;
        assert!(decode_bool(&data).is_err());
        assert!(decode_bool(&[0u8; 4]).is_err());
    }

    #[test]
    fn decodes_result_tuple() {
        let hash = keccak256("SimulatedResult_1");
        let mut data = hash.to_vec();
        data.extend_from_slice(&U256::from(92u64).to_be_bytes::<32>());
        let (decoded_hash, accuracy) = decode_hash_and_uint(&data).expect("decode");
        assert_eq!(decoded_hash, hash);
        assert_eq!(accuracy, U256::from(92u64));
        assert!(decode_hash_and_uint(&data[..40]).is_err());
    }
}
