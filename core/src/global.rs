// Copyright 2018 The LiteSPV Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-network compiled-in parameters: checkpoints, DNS seeds, network
//! magic and standard ports, for the Litecoin main and test networks.
//!
//! Checkpoints double as starting points for partial chain downloads, so
//! every one of them sits on a difficulty transition boundary; that way the
//! retarget immediately following a checkpoint can still be verified.

use crate::block::MerkleBlock;
use crate::hash::Hash;

/// The chain parameters to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainTypes {
	/// Main production network.
	Mainnet,
	/// Public test network.
	Testnet,
}

/// A hard-coded trust anchor. Blocks at a checkpoint height must match it.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
	/// Block height, always a multiple of the difficulty interval.
	pub height: u32,
	/// Block hash in display order.
	pub hash: &'static str,
	/// Block timestamp.
	pub timestamp: u32,
	/// Compact difficulty target.
	pub target: u32,
}

impl Checkpoint {
	/// Materializes the checkpoint as a transaction-less merkle block.
	pub fn to_block(&self) -> MerkleBlock {
		MerkleBlock {
			block_hash: Hash::from_hex(self.hash).expect("malformed checkpoint hash"),
			prev_block: crate::hash::ZERO_HASH,
			timestamp: self.timestamp,
			difficulty_target: self.target,
			total_tx: 0,
			tx_hashes: vec![],
			height: self.height,
		}
	}
}

const MAINNET_CHECKPOINTS: &[Checkpoint] = &[
	Checkpoint { height: 0, hash: "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2", timestamp: 1317972665, target: 0x1e0ffff0 },
	Checkpoint { height: 20160, hash: "633036c8df655531c2449b2d09b264cc0b49d945a89be23fd3c1a97361ca198c", timestamp: 1319798300, target: 0x1d055262 },
	Checkpoint { height: 40320, hash: "d148cdd2cf44069cef4b63f0feaf30a8d291ca9ea9ba7e83f226b9738c1d5e9c", timestamp: 1322522019, target: 0x1d018053 },
	Checkpoint { height: 60480, hash: "3250f0a560d55f039c34bfaee1b71297aa5104ac6641778f9a87d73232d12c6c", timestamp: 1325540574, target: 0x1d00e848 },
	Checkpoint { height: 80640, hash: "bedc0a090b740b1902d870aeb6caa89040a24e7d670d46f8ef035fd9d2e9ce80", timestamp: 1328779944, target: 0x1d00ab92 },
	Checkpoint { height: 100800, hash: "7b0b620d15f781faaaa73b43607a49d5becb2b803ef19b4010014646cc177a61", timestamp: 1331873688, target: 0x1d00ae9f },
	Checkpoint { height: 120960, hash: "dbd6249f30e5690890bc03dabcc0a526c46adcde572be06af4075b6ea28aa251", timestamp: 1334881566, target: 0x1d009e48 },
	Checkpoint { height: 141120, hash: "5d5e15a45cecf2b9528e36e63c407167423a2f9963a96bbce3b67b75fd10be2a", timestamp: 1338009318, target: 0x1d00d6a6 },
	Checkpoint { height: 161280, hash: "f595c754d0abcfe3616573bfabee01b230ec0ea6b2f2894c40214ea23d772b6c", timestamp: 1340918301, target: 0x1d008881 },
	Checkpoint { height: 181440, hash: "d7fa3152959f3c25e33edf825f7cbef75ee651d5f9183cc4ed8d19d57b8f35a4", timestamp: 1343534530, target: 0x1c1cd430 },
	Checkpoint { height: 201600, hash: "d481df8e8ce144fca9ae6b3157cc706e903c6ea161a13d2c421270354a02d6d0", timestamp: 1346567025, target: 0x1c1c89e8 },
	Checkpoint { height: 221760, hash: "88cf3446129161a633050244f112e3041a2d53152ee9293984b20f468fbadb8a", timestamp: 1349481542, target: 0x1c135d42 },
	Checkpoint { height: 241920, hash: "8619aa9c734b517bd3a707278ee3632c96570f3e1fd804194bdfc0b02d1b6c4e", timestamp: 1352384870, target: 0x1c0b39e8 },
	Checkpoint { height: 262080, hash: "13a5d47f01fe3ab17ebf2b15b605efa41efe06b02bb685bc2ad4cec22af0b478", timestamp: 1355560195, target: 0x1c0a01e5 },
	Checkpoint { height: 282240, hash: "8932095fba44bd6860fd71745c0dca908769221a47166ab1fb442b6cefcd53fb", timestamp: 1358801720, target: 0x1c0ced21 },
	Checkpoint { height: 302400, hash: "e798d897a837bf4989d329266128754ec1cbeff1eb0c0afd67f71d2b7c44bdaa", timestamp: 1361913149, target: 0x1c102ea7 },
	Checkpoint { height: 322560, hash: "3e5857760633de4604d388fed7126a22ba840ea320c8cde6a84df981bc8b751d", timestamp: 1364498291, target: 0x1c02a944 },
	Checkpoint { height: 342720, hash: "33f62e026a202be550e8a9df37d638d38991553544e279cb264123378bf46042", timestamp: 1367113967, target: 0x1c0095a5 },
	Checkpoint { height: 362880, hash: "77a4b194e8c7f6600ed622b8f60cb9d96eeb0a0b837201e605de14016edfda39", timestamp: 1370052623, target: 0x1b6929f2 },
	Checkpoint { height: 383040, hash: "5c0a443361c1356796a7db472c69433b6ce6108d61e4403fd9a9d91e01009ce3", timestamp: 1372971948, target: 0x1b481262 },
	Checkpoint { height: 403200, hash: "ef78aa1925cc51ff8dc3a1e59f389c89845fb8b9e566348222e663e963e67640", timestamp: 1376014028, target: 0x1b4b858d },
	Checkpoint { height: 423360, hash: "7b23f9447b8078c8fc0e832e4b56f1d2afa758382e254593b6b72a8fc6020150", timestamp: 1379024440, target: 0x1b438e6a },
	Checkpoint { height: 443520, hash: "37d668803ed1efc24ffab4a2a90da9ac92679acf68370d7570f042c2bd6d651b", timestamp: 1382034998, target: 0x1b3f864f },
	Checkpoint { height: 463680, hash: "260c78e92a390b9eb4d8f5d9324a33d0222943f119b324de53452d48bd7bd7f4", timestamp: 1384968613, target: 0x1b2ddc00 },
	Checkpoint { height: 483840, hash: "759de6c4e6161fc8c996cf0d5e012ee0afc52a037e657dd54e85da9a9f803633", timestamp: 1387792541, target: 0x1b167254 },
	Checkpoint { height: 504000, hash: "97db0624d3d5137bc085f0d731607314972bb4124b85b73420ef9aa5fc10d640", timestamp: 1390892377, target: 0x1b1aa868 },
	Checkpoint { height: 524160, hash: "1d033d3abedb7faa15dad1bbe9c7fc7151746537cf091584be567d321e7c5cd0", timestamp: 1393845878, target: 0x1b120577 },
	Checkpoint { height: 544320, hash: "95ae252971d1ec9deeed1ed19fe9537e04348a82839a9e2bf8856faaa03e324e", timestamp: 1396719779, target: 0x1b0a9622 },
	Checkpoint { height: 564480, hash: "c876276bf12754c2b265787d9e7ab83d429e59761dc63057f728529018db7834", timestamp: 1399724592, target: 0x1b099dce },
	Checkpoint { height: 584640, hash: "df5454af79491c392fe740b5efd47afbe1cb53cd8d86be3ab9c97fdd2786d237", timestamp: 1402630524, target: 0x1b065b94 },
	Checkpoint { height: 604800, hash: "43c1a80b8abaf57817e5daea9cfdde99ea5f324705779045792ccad52d54f3d4", timestamp: 1405459509, target: 0x1b033d34 },
	Checkpoint { height: 624960, hash: "ccac71fafe98107b81ac3e0eed41190e4d47600962c93c49db8843b53f760bda", timestamp: 1408389228, target: 0x1b02552d },
	Checkpoint { height: 645120, hash: "9b7ddc3753c5138fc471accd15f9730020e828bc69058f2e382549c7c0ffba0f", timestamp: 1411376787, target: 0x1b020a10 },
	Checkpoint { height: 665280, hash: "163c902de2306f22922754f83edacc97a87617d1e3413af7c9808e702bf1a383", timestamp: 1414354222, target: 0x1b01bce9 },
	Checkpoint { height: 685440, hash: "29d2328990dda4c4870846d4e3d573785452bed68e6013930a83fc8d5fe89b09", timestamp: 1417289378, target: 0x1b01473b },
	Checkpoint { height: 705600, hash: "e350118d9047c1ca5f047a1b1ee400562fb0cfb8b3c8032b56b8545b456a03ab", timestamp: 1420305710, target: 0x1b01399e },
	Checkpoint { height: 725760, hash: "6b2ac7ffb71fc5056c00fee8404813d7ea98e5f303a5ddb26c09fb397b51b7e7", timestamp: 1423407371, target: 0x1b01905e },
	Checkpoint { height: 745920, hash: "04809a35ff6e5054e21d14582072605b812b7d4ae11d3450e7c03a7237e1d35d", timestamp: 1426441593, target: 0x1b019b8c },
	Checkpoint { height: 766080, hash: "ba9e143a958c917753785f11c143ca62f928748c33888278fcaea96f054f15d2", timestamp: 1429473619, target: 0x1b019e8f },
	Checkpoint { height: 786240, hash: "d1b9fa6999f7a09d1dc52511750e47d263aaa7ea4a262762fff8665890d631a5", timestamp: 1432507384, target: 0x1b01a8ec },
	Checkpoint { height: 806400, hash: "e2363e8b3e8f237b9b1bfc1c72ede80fef2c7bd1aabcd78afed82065a194b960", timestamp: 1435516150, target: 0x1b019268 },
	Checkpoint { height: 826560, hash: "e12ce49268950a38fd7f0bab0d2a5edd9799201c1f3e9441a7602428556c839d", timestamp: 1438510426, target: 0x1b016999 },
	Checkpoint { height: 846720, hash: "6f5d94d7cfd01f1dbf4aa631b987f8e2ec9d0c57720604787b816bafe34192a8", timestamp: 1441561050, target: 0x1b0187a3 },
	Checkpoint { height: 866880, hash: "72a9f3d3710fc6c96f87dd8fca0e033a1a89f69a4c2fd8944fd1d50e6772021e", timestamp: 1444547836, target: 0x1b0157fd },
	Checkpoint { height: 887040, hash: "089c03de0c0dd0dffaa044fd5a3b51679be2ae34b048a8d6bcc39aab664c156a", timestamp: 1447578790, target: 0x1b015f6a },
	Checkpoint { height: 889056, hash: "910af99e39a6f9436bf4710a09ee19483e9b9b3f131dc9bef37dbe5eac72031f", timestamp: 1447887833, target: 0x1b016720 },
	Checkpoint { height: 901152, hash: "cfccdf8e3830ae4879e910051ac3dc583b4fb45b83be3a38019e5d9326dfa223", timestamp: 1449698771, target: 0x1b015b0e },
	Checkpoint { height: 913248, hash: "9784249cbeccd4df8d7701287da3002a6de4a56618248f84f37187dbf4ec6efc", timestamp: 1451495881, target: 0x1b014465 },
	Checkpoint { height: 921312, hash: "ab2357460c0a20caebfab76a7939c4e64a5068eddce4fbec749089be2e88e702", timestamp: 1452685882, target: 0x1b012ee0 },
	Checkpoint { height: 933408, hash: "f9f3fbcbb1fa40d0f9a1724085ac7cadaa414edd97c436571d06b3b5f3b46956", timestamp: 1454513411, target: 0x1b01386f },
	Checkpoint { height: 941472, hash: "4fddb941d414f071c29f100da2a160cf527397fc9a7a9c9d0a849b6f67799042", timestamp: 1455719547, target: 0x1b0133ec },
	Checkpoint { height: 953568, hash: "e46e01cf1239cffa69408ac162d517bac5a4899972e0328fd0ba4d93e8ad3764", timestamp: 1457542869, target: 0x1b013c91 },
	Checkpoint { height: 961632, hash: "bfc01091cb21ea81dd079fcee6cf7910087281bfdbcb1ad9e5dbc226b5f45a86", timestamp: 1458730622, target: 0x1b012535 },
	Checkpoint { height: 973728, hash: "6316b454ead6c97be48c98979ec9ebb49763c21d436f47ff6918f02a58b46cec", timestamp: 1460575822, target: 0x1b014319 },
	Checkpoint { height: 981792, hash: "155bc8fb717564bd2dd600cedcb39d8a7a64070e3bc1b90e7be62168e7b35c82", timestamp: 1461788191, target: 0x1b01436f },
	Checkpoint { height: 993888, hash: "1d80e7793bd9e16e0ce84d93b105d6732ed63e1a6fe491c1b7ea310e75eb504e", timestamp: 1463613744, target: 0x1b014cbd },
	Checkpoint { height: 1001952, hash: "eccbede26ac99ea996377972d5bd05b9306bcc6ac1f4071f1587e3094a704dff", timestamp: 1464900396, target: 0x1b01a29e },
	Checkpoint { height: 1058400, hash: "76ce37c66d449a4ffbfc35674cf932da701066a001dc223754f9250dd2bdbc62", timestamp: 1473296285, target: 0x1b013ca7 },
];

const TESTNET_CHECKPOINTS: &[Checkpoint] = &[
	Checkpoint { height: 0, hash: "4966625a4b2851d9fdee139e56211a0d88575f59ed816ff5e6a63deb4e3e29a0", timestamp: 1486949366, target: 0x1e0ffff0 },
];

const MAINNET_DNS_SEEDS: &[&str] = &[
	"dnsseed.litecointools.com.",
	"dnsseed.litecoinpool.org.",
	"seed-a.litecoin.loshan.co.uk.",
	"dnsseed.thrasher.io.",
	"dnsseed.koin-project.com.",
];

const TESTNET_DNS_SEEDS: &[&str] = &[
	"testnet-seed.ltc.xurious.com.",
	"seed-b.litecoin.loshan.co.uk.",
	"dnsseed-testnet.thrasher.io.",
];

impl ChainTypes {
	/// Message start bytes for the network.
	pub fn magic(&self) -> [u8; 4] {
		match self {
			ChainTypes::Mainnet => [0xfb, 0xc0, 0xb6, 0xdb],
			ChainTypes::Testnet => [0xfd, 0xd2, 0xc8, 0xf1],
		}
	}

	/// Default p2p listening port for the network.
	pub fn standard_port(&self) -> u16 {
		match self {
			ChainTypes::Mainnet => 9333,
			ChainTypes::Testnet => 19335,
		}
	}

	/// Hostnames resolved for initial peer discovery.
	pub fn dns_seeds(&self) -> &'static [&'static str] {
		match self {
			ChainTypes::Mainnet => MAINNET_DNS_SEEDS,
			ChainTypes::Testnet => TESTNET_DNS_SEEDS,
		}
	}

	/// The compiled-in checkpoint table, ascending by height.
	pub fn checkpoints(&self) -> &'static [Checkpoint] {
		match self {
			ChainTypes::Mainnet => MAINNET_CHECKPOINTS,
			ChainTypes::Testnet => TESTNET_CHECKPOINTS,
		}
	}

	/// Hash of the genesis block.
	pub fn genesis_hash(&self) -> Hash {
		Hash::from_hex(self.checkpoints()[0].hash).expect("malformed genesis hash")
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::consensus::DIFFICULTY_INTERVAL;

	#[test]
	fn checkpoints_are_on_transition_boundaries() {
		for chain in &[ChainTypes::Mainnet, ChainTypes::Testnet] {
			for cp in chain.checkpoints() {
				assert_eq!(cp.height % DIFFICULTY_INTERVAL, 0, "height {}", cp.height);
			}
		}
	}

	#[test]
	fn checkpoints_ascend_and_parse() {
		let mut last = None;
		for cp in ChainTypes::Mainnet.checkpoints() {
			let block = cp.to_block();
			assert_eq!(block.height, cp.height);
			assert!(block.is_transition());
			if let Some(prev) = last {
				assert!(cp.height > prev);
			}
			last = Some(cp.height);
		}
	}

	#[test]
	fn genesis_hashes() {
		assert_eq!(
			format!("{}", ChainTypes::Mainnet.genesis_hash()),
			"12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2"
		);
		assert_eq!(
			format!("{}", ChainTypes::Testnet.genesis_hash()),
			"4966625a4b2851d9fdee139e56211a0d88575f59ed816ff5e6a63deb4e3e29a0"
		);
	}
}
