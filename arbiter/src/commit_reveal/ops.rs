//! Modular arithmetic for the commitment exchange.

use num_bigint::{BigUint, RandBigInt};
use rand::{CryptoRng, Rng};

/// Prime modulus shared by all deployments (decimal).
const MODULUS: &str = concat!(
    "1242333416358552924206816981488456810148448660562121766326551736024441355817793419285844",
    "5194683182035762258724921947757714500930010682896746660214610456216316040010339673567204",
    "1344557638270362523343149686623705761738910044071399582025053147811261321814632661084042",
    "311141045136246602979886564584763268994320823"
);

/// Generator shared by all deployments (decimal).
const GENERATOR: &str = concat!(
    "5787998526316113006801623998161516117438590271664764245289997119843908425955125023004108",
    "6427537114453738884538337956090286524329552098304591825815816298805245947460536391128315",
    "5221935564642854171351600580868691610639414634907481683524011789391294409346098618886747",
    "26565294073773971086710395310743717916632171"
);

/// Draws a uniform secret of at most `bits` bits.
///
/// Secrets are drawn from the runtime context so deterministic executions
/// remain reproducible.
pub fn generate_secret<R: Rng + CryptoRng>(rng: &mut R, bits: u64) -> BigUint {
    rng.gen_biguint(bits)
}

/// The group in which commitments are exchanged.
///
/// Both constants are public protocol parameters, not secrets: every signer
/// must exponentiate over the same group for the exchange to verify.
pub struct Group {
    /// Prime modulus.
    pub modulus: BigUint,

    /// Generator.
    pub generator: BigUint,
}

impl Group {
    /// Returns the group used by all deployments.
    pub fn standard() -> Self {
        let modulus = BigUint::parse_bytes(MODULUS.as_bytes(), 10).expect("modulus is decimal");
        let generator =
            BigUint::parse_bytes(GENERATOR.as_bytes(), 10).expect("generator is decimal");
        Self { modulus, generator }
    }

    /// Computes the public commitment to `secret` (the generator raised to the
    /// secret, reduced by the modulus).
    pub fn commit(&self, secret: &BigUint) -> BigUint {
        self.generator.modpow(secret, &self.modulus)
    }

    /// Raises an exchanged value to a local exponent, reduced by the modulus.
    ///
    /// Combining a counterparty's commitment with the local secret and the
    /// local commitment with the counterparty's reveal yields the same value
    /// if (and only if) the counterparty revealed the secret it committed to.
    pub fn combine(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.modpow(exponent, &self.modulus)
    }
}
