//! Shared constants and lookup tables
//!
//! Opsin color constants, the dequantization matrix sets, and the entropy
//! coder's fixed tables live here so that encoder and decoder agree by
//! construction.

/// Linear dimension of a coding block.
pub const BLOCK_DIM: usize = 8;
/// Coefficients per block.
pub const BLOCK_SIZE: usize = 64;
/// Blocks per tile edge; tiles are the unit of cross-channel decorrelation
/// and of per-tile distance aggregation.
pub const TILE_IN_BLOCKS: usize = 8;
/// Largest width or height the bitstream can represent.
pub const MAX_IMAGE_DIM: usize = (1 << 25) - 1;

// ============================================================================
// Opsin color space
// ============================================================================

/// Cone absorbance matrix applied to linear RGB, row-major. Rows sum to
/// one, so white maps to unit absorbance in every channel.
pub const OPSIN_ABSORBANCE_MATRIX: [f32; 9] = [
    0.355_028_25, 0.589_422_22, 0.055_549_53,
    0.205_185_97, 0.719_527_86, 0.075_286_17,
    0.077_220_62, 0.130_812_95, 0.791_966_43,
];

/// Red-channel scale of the opponent mix.
pub const OPSIN_SCALE_R: f32 = 1.001_746_9;

/// Green-channel scale of the opponent mix; the two scales sum to 2, so
/// gray keeps `Y = cuberoot(intensity)`.
pub const OPSIN_SCALE_G: f32 = 0.998_253_1;

/// Inverse of `OPSIN_ABSORBANCE_MATRIX`, row-major.
pub const INVERSE_OPSIN_ABSORBANCE_MATRIX: [f32; 9] = [
    5.340_218_97, -4.382_234_63, 0.042_015_65,
    -1.494_198_72, 2.640_395_89, -0.146_197_18,
    -0.273_893_51, -0.008_837_64, 1.282_731_15,
];

/// Center of the XYB gamut reachable from sRGB; subtracted before coding.
pub const XYB_CENTER: [f32; 3] = [0.015_340_14, 0.5, 0.5];

/// Half-width of the XYB gamut around `XYB_CENTER`.
pub const XYB_RANGE: [f32; 3] = [0.044_930_30, 0.5, 0.5];

/// sRGB byte value to linear intensity.
#[rustfmt::skip]
pub static SRGB8_TO_LINEAR: [f32; 256] = [
    0.00000000e+00, 3.03526984e-04, 6.07053967e-04, 9.10580951e-04,
    1.21410793e-03, 1.51763492e-03, 1.82116190e-03, 2.12468888e-03,
    2.42821587e-03, 2.73174285e-03, 3.03526984e-03, 3.34653576e-03,
    3.67650732e-03, 4.02471702e-03, 4.39144204e-03, 4.77695348e-03,
    5.18151670e-03, 5.60539162e-03, 6.04883302e-03, 6.51209079e-03,
    6.99541019e-03, 7.49903204e-03, 8.02319299e-03, 8.56812562e-03,
    9.13405870e-03, 9.72121732e-03, 1.03298230e-02, 1.09600940e-02,
    1.16122452e-02, 1.22864884e-02, 1.29830323e-02, 1.37020830e-02,
    1.44438436e-02, 1.52085144e-02, 1.59962934e-02, 1.68073758e-02,
    1.76419545e-02, 1.85002201e-02, 1.93823610e-02, 2.02885631e-02,
    2.12190104e-02, 2.21738848e-02, 2.31533662e-02, 2.41576324e-02,
    2.51868596e-02, 2.62412219e-02, 2.73208916e-02, 2.84260395e-02,
    2.95568344e-02, 3.07134437e-02, 3.18960331e-02, 3.31047666e-02,
    3.43398068e-02, 3.56013149e-02, 3.68894504e-02, 3.82043716e-02,
    3.95462353e-02, 4.09151969e-02, 4.23114106e-02, 4.37350293e-02,
    4.51862044e-02, 4.66650863e-02, 4.81718242e-02, 4.97065660e-02,
    5.12694584e-02, 5.28606470e-02, 5.44802764e-02, 5.61284900e-02,
    5.78054302e-02, 5.95112382e-02, 6.12460542e-02, 6.30100177e-02,
    6.48032667e-02, 6.66259386e-02, 6.84781698e-02, 7.03600957e-02,
    7.22718507e-02, 7.42135684e-02, 7.61853815e-02, 7.81874218e-02,
    8.02198203e-02, 8.22827071e-02, 8.43762115e-02, 8.65004620e-02,
    8.86555863e-02, 9.08417112e-02, 9.30589628e-02, 9.53074666e-02,
    9.75873471e-02, 9.98987282e-02, 1.02241733e-01, 1.04616484e-01,
    1.07023103e-01, 1.09461711e-01, 1.11932428e-01, 1.14435374e-01,
    1.16970668e-01, 1.19538428e-01, 1.22138772e-01, 1.24771818e-01,
    1.27437680e-01, 1.30136477e-01, 1.32868322e-01, 1.35633330e-01,
    1.38431615e-01, 1.41263291e-01, 1.44128471e-01, 1.47027266e-01,
    1.49959790e-01, 1.52926152e-01, 1.55926464e-01, 1.58960835e-01,
    1.62029376e-01, 1.65132195e-01, 1.68269400e-01, 1.71441101e-01,
    1.74647404e-01, 1.77888416e-01, 1.81164244e-01, 1.84474995e-01,
    1.87820772e-01, 1.91201683e-01, 1.94617830e-01, 1.98069320e-01,
    2.01556254e-01, 2.05078736e-01, 2.08636870e-01, 2.12230757e-01,
    2.15860500e-01, 2.19526200e-01, 2.23227957e-01, 2.26965874e-01,
    2.30740049e-01, 2.34550582e-01, 2.38397574e-01, 2.42281122e-01,
    2.46201327e-01, 2.50158285e-01, 2.54152094e-01, 2.58182853e-01,
    2.62250658e-01, 2.66355605e-01, 2.70497791e-01, 2.74677312e-01,
    2.78894263e-01, 2.83148740e-01, 2.87440838e-01, 2.91770650e-01,
    2.96138271e-01, 3.00543794e-01, 3.04987314e-01, 3.09468923e-01,
    3.13988713e-01, 3.18546778e-01, 3.23143209e-01, 3.27778098e-01,
    3.32451536e-01, 3.37163615e-01, 3.41914425e-01, 3.46704056e-01,
    3.51532600e-01, 3.56400144e-01, 3.61306780e-01, 3.66252596e-01,
    3.71237680e-01, 3.76262123e-01, 3.81326011e-01, 3.86429434e-01,
    3.91572478e-01, 3.96755231e-01, 4.01977780e-01, 4.07240212e-01,
    4.12542613e-01, 4.17885071e-01, 4.23267670e-01, 4.28690497e-01,
    4.34153636e-01, 4.39657174e-01, 4.45201195e-01, 4.50785783e-01,
    4.56411023e-01, 4.62077000e-01, 4.67783796e-01, 4.73531496e-01,
    4.79320183e-01, 4.85149940e-01, 4.91020850e-01, 4.96932995e-01,
    5.02886458e-01, 5.08881321e-01, 5.14917665e-01, 5.20995573e-01,
    5.27115126e-01, 5.33276404e-01, 5.39479489e-01, 5.45724461e-01,
    5.52011402e-01, 5.58340390e-01, 5.64711506e-01, 5.71124829e-01,
    5.77580440e-01, 5.84078418e-01, 5.90618841e-01, 5.97201788e-01,
    6.03827339e-01, 6.10495571e-01, 6.17206562e-01, 6.23960392e-01,
    6.30757136e-01, 6.37596874e-01, 6.44479682e-01, 6.51405637e-01,
    6.58374817e-01, 6.65387298e-01, 6.72443157e-01, 6.79542470e-01,
    6.86685312e-01, 6.93871761e-01, 7.01101892e-01, 7.08375780e-01,
    7.15693501e-01, 7.23055129e-01, 7.30460740e-01, 7.37910409e-01,
    7.45404210e-01, 7.52942217e-01, 7.60524505e-01, 7.68151147e-01,
    7.75822218e-01, 7.83537792e-01, 7.91297940e-01, 7.99102738e-01,
    8.06952258e-01, 8.14846572e-01, 8.22785754e-01, 8.30769877e-01,
    8.38799012e-01, 8.46873232e-01, 8.54992608e-01, 8.63157213e-01,
    8.71367119e-01, 8.79622397e-01, 8.87923118e-01, 8.96269353e-01,
    9.04661174e-01, 9.13098652e-01, 9.21581856e-01, 9.30110858e-01,
    9.38685728e-01, 9.47306537e-01, 9.55973353e-01, 9.64686248e-01,
    9.73445290e-01, 9.82250550e-01, 9.91102097e-01, 1.00000000e+00,
];

// ============================================================================
// Dequantization matrices
// ============================================================================
//
// Entries are in the transposed coefficient layout used by the DCT; both
// tables are symmetric in (u, v) so the layout cannot be confused. The DCT
// output scale is folded in.

/// AC dequantization matrices for the Default template, per channel (X, Y, B).
#[rustfmt::skip]
pub static DEQUANT_MATRIX_DEFAULT: [[f32; 64]; 3] = [
    [
        6.000000e-03, 7.500000e-03, 9.000000e-03, 1.050000e-02, 1.200000e-02, 1.350000e-02, 1.500000e-02, 1.650000e-02,
        7.500000e-03, 9.240000e-03, 1.098000e-02, 1.272000e-02, 1.446000e-02, 1.620000e-02, 1.794000e-02, 1.968000e-02,
        9.000000e-03, 1.098000e-02, 1.296000e-02, 1.494000e-02, 1.692000e-02, 1.890000e-02, 2.088000e-02, 2.286000e-02,
        1.050000e-02, 1.272000e-02, 1.494000e-02, 1.716000e-02, 1.938000e-02, 2.160000e-02, 2.382000e-02, 2.604000e-02,
        1.200000e-02, 1.446000e-02, 1.692000e-02, 1.938000e-02, 2.184000e-02, 2.430000e-02, 2.676000e-02, 2.922000e-02,
        1.350000e-02, 1.620000e-02, 1.890000e-02, 2.160000e-02, 2.430000e-02, 2.700000e-02, 2.970000e-02, 3.240000e-02,
        1.500000e-02, 1.794000e-02, 2.088000e-02, 2.382000e-02, 2.676000e-02, 2.970000e-02, 3.264000e-02, 3.558000e-02,
        1.650000e-02, 1.968000e-02, 2.286000e-02, 2.604000e-02, 2.922000e-02, 3.240000e-02, 3.558000e-02, 3.876000e-02,
    ],
    [
        3.000000e-03, 3.750000e-03, 4.500000e-03, 5.250000e-03, 6.000000e-03, 6.750000e-03, 7.500000e-03, 8.250000e-03,
        3.750000e-03, 4.620000e-03, 5.490000e-03, 6.360000e-03, 7.230000e-03, 8.100000e-03, 8.970000e-03, 9.840000e-03,
        4.500000e-03, 5.490000e-03, 6.480000e-03, 7.470000e-03, 8.460000e-03, 9.450000e-03, 1.044000e-02, 1.143000e-02,
        5.250000e-03, 6.360000e-03, 7.470000e-03, 8.580000e-03, 9.690000e-03, 1.080000e-02, 1.191000e-02, 1.302000e-02,
        6.000000e-03, 7.230000e-03, 8.460000e-03, 9.690000e-03, 1.092000e-02, 1.215000e-02, 1.338000e-02, 1.461000e-02,
        6.750000e-03, 8.100000e-03, 9.450000e-03, 1.080000e-02, 1.215000e-02, 1.350000e-02, 1.485000e-02, 1.620000e-02,
        7.500000e-03, 8.970000e-03, 1.044000e-02, 1.191000e-02, 1.338000e-02, 1.485000e-02, 1.632000e-02, 1.779000e-02,
        8.250000e-03, 9.840000e-03, 1.143000e-02, 1.302000e-02, 1.461000e-02, 1.620000e-02, 1.779000e-02, 1.938000e-02,
    ],
    [
        8.500000e-03, 1.062500e-02, 1.275000e-02, 1.487500e-02, 1.700000e-02, 1.912500e-02, 2.125000e-02, 2.337500e-02,
        1.062500e-02, 1.309000e-02, 1.555500e-02, 1.802000e-02, 2.048500e-02, 2.295000e-02, 2.541500e-02, 2.788000e-02,
        1.275000e-02, 1.555500e-02, 1.836000e-02, 2.116500e-02, 2.397000e-02, 2.677500e-02, 2.958000e-02, 3.238500e-02,
        1.487500e-02, 1.802000e-02, 2.116500e-02, 2.431000e-02, 2.745500e-02, 3.060000e-02, 3.374500e-02, 3.689000e-02,
        1.700000e-02, 2.048500e-02, 2.397000e-02, 2.745500e-02, 3.094000e-02, 3.442500e-02, 3.791000e-02, 4.139500e-02,
        1.912500e-02, 2.295000e-02, 2.677500e-02, 3.060000e-02, 3.442500e-02, 3.825000e-02, 4.207500e-02, 4.590000e-02,
        2.125000e-02, 2.541500e-02, 2.958000e-02, 3.374500e-02, 3.791000e-02, 4.207500e-02, 4.624000e-02, 5.040500e-02,
        2.337500e-02, 2.788000e-02, 3.238500e-02, 3.689000e-02, 4.139500e-02, 4.590000e-02, 5.040500e-02, 5.491000e-02,
    ],
];

/// AC dequantization matrices for the HQ template, per channel (X, Y, B).
#[rustfmt::skip]
pub static DEQUANT_MATRIX_HQ: [[f32; 64]; 3] = [
    [
        4.200000e-03, 4.956000e-03, 5.712000e-03, 6.468000e-03, 7.224000e-03, 7.980000e-03, 8.736000e-03, 9.492000e-03,
        4.956000e-03, 5.838000e-03, 6.720000e-03, 7.602000e-03, 8.484000e-03, 9.366000e-03, 1.024800e-02, 1.113000e-02,
        5.712000e-03, 6.720000e-03, 7.728000e-03, 8.736000e-03, 9.744000e-03, 1.075200e-02, 1.176000e-02, 1.276800e-02,
        6.468000e-03, 7.602000e-03, 8.736000e-03, 9.870000e-03, 1.100400e-02, 1.213800e-02, 1.327200e-02, 1.440600e-02,
        7.224000e-03, 8.484000e-03, 9.744000e-03, 1.100400e-02, 1.226400e-02, 1.352400e-02, 1.478400e-02, 1.604400e-02,
        7.980000e-03, 9.366000e-03, 1.075200e-02, 1.213800e-02, 1.352400e-02, 1.491000e-02, 1.629600e-02, 1.768200e-02,
        8.736000e-03, 1.024800e-02, 1.176000e-02, 1.327200e-02, 1.478400e-02, 1.629600e-02, 1.780800e-02, 1.932000e-02,
        9.492000e-03, 1.113000e-02, 1.276800e-02, 1.440600e-02, 1.604400e-02, 1.768200e-02, 1.932000e-02, 2.095800e-02,
    ],
    [
        2.100000e-03, 2.478000e-03, 2.856000e-03, 3.234000e-03, 3.612000e-03, 3.990000e-03, 4.368000e-03, 4.746000e-03,
        2.478000e-03, 2.919000e-03, 3.360000e-03, 3.801000e-03, 4.242000e-03, 4.683000e-03, 5.124000e-03, 5.565000e-03,
        2.856000e-03, 3.360000e-03, 3.864000e-03, 4.368000e-03, 4.872000e-03, 5.376000e-03, 5.880000e-03, 6.384000e-03,
        3.234000e-03, 3.801000e-03, 4.368000e-03, 4.935000e-03, 5.502000e-03, 6.069000e-03, 6.636000e-03, 7.203000e-03,
        3.612000e-03, 4.242000e-03, 4.872000e-03, 5.502000e-03, 6.132000e-03, 6.762000e-03, 7.392000e-03, 8.022000e-03,
        3.990000e-03, 4.683000e-03, 5.376000e-03, 6.069000e-03, 6.762000e-03, 7.455000e-03, 8.148000e-03, 8.841000e-03,
        4.368000e-03, 5.124000e-03, 5.880000e-03, 6.636000e-03, 7.392000e-03, 8.148000e-03, 8.904000e-03, 9.660000e-03,
        4.746000e-03, 5.565000e-03, 6.384000e-03, 7.203000e-03, 8.022000e-03, 8.841000e-03, 9.660000e-03, 1.047900e-02,
    ],
    [
        6.000000e-03, 7.080000e-03, 8.160000e-03, 9.240000e-03, 1.032000e-02, 1.140000e-02, 1.248000e-02, 1.356000e-02,
        7.080000e-03, 8.340000e-03, 9.600000e-03, 1.086000e-02, 1.212000e-02, 1.338000e-02, 1.464000e-02, 1.590000e-02,
        8.160000e-03, 9.600000e-03, 1.104000e-02, 1.248000e-02, 1.392000e-02, 1.536000e-02, 1.680000e-02, 1.824000e-02,
        9.240000e-03, 1.086000e-02, 1.248000e-02, 1.410000e-02, 1.572000e-02, 1.734000e-02, 1.896000e-02, 2.058000e-02,
        1.032000e-02, 1.212000e-02, 1.392000e-02, 1.572000e-02, 1.752000e-02, 1.932000e-02, 2.112000e-02, 2.292000e-02,
        1.140000e-02, 1.338000e-02, 1.536000e-02, 1.734000e-02, 1.932000e-02, 2.130000e-02, 2.328000e-02, 2.526000e-02,
        1.248000e-02, 1.464000e-02, 1.680000e-02, 1.896000e-02, 2.112000e-02, 2.328000e-02, 2.544000e-02, 2.760000e-02,
        1.356000e-02, 1.590000e-02, 1.824000e-02, 2.058000e-02, 2.292000e-02, 2.526000e-02, 2.760000e-02, 2.994000e-02,
    ],
];

/// DC dequantization steps for the Default template, per channel.
pub const DC_DEQUANT_DEFAULT: [f32; 3] = [0.0060, 0.0015, 0.0040];

/// DC dequantization steps for the HQ template, per channel.
pub const DC_DEQUANT_HQ: [f32; 3] = [0.0042, 0.0010, 0.0028];

// ============================================================================
// Entropy coder tables
// ============================================================================

/// Zig-zag scan over an 8x8 block, as offsets into a row-major block.
/// The 16 trailing copies of 63 keep out-of-range reads in the decoder safe.
#[rustfmt::skip]
pub const NATURAL_COEFF_ORDER: [usize; BLOCK_SIZE + 16] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40,
    48, 41, 34, 27, 20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51, 58, 59, 52, 45, 38, 31, 39, 46, 53, 60, 61,
    54, 47, 55, 62, 63,
    63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63, 63,
];

/// Maps a (run << 4 | magnitude) byte to its rank in decreasing population
/// count, keeping the first end-of-block symbol in place.
#[rustfmt::skip]
pub const INDEX_LUT: [u8; 256] = [
    0,   1,   2,   3,   5,   10,  17,  32,  68,  83,  84,  85,  86,  87,  88,
    89,  90,  4,   7,   12,  22,  31,  43,  60,  91,  92,  93,  94,  95,  96,
    97,  98,  99,  6,   14,  26,  36,  48,  66,  100, 101, 102, 103, 104, 105,
    106, 107, 108, 109, 8,   19,  34,  44,  57,  78,  110, 111, 112, 113, 114,
    115, 116, 117, 118, 119, 9,   27,  39,  52,  61,  79,  120, 121, 122, 123,
    124, 125, 126, 127, 128, 129, 11,  28,  41,  53,  64,  80,  130, 131, 132,
    133, 134, 135, 136, 137, 138, 139, 13,  33,  46,  63,  72,  140, 141, 142,
    143, 144, 145, 146, 147, 148, 149, 150, 15,  35,  47,  65,  69,  151, 152,
    153, 154, 155, 156, 157, 158, 159, 160, 161, 16,  37,  51,  62,  74,  162,
    163, 164, 165, 166, 167, 168, 169, 170, 171, 172, 18,  38,  50,  59,  75,
    173, 174, 175, 176, 177, 178, 179, 180, 181, 182, 183, 20,  40,  54,  76,
    82,  184, 185, 186, 187, 188, 189, 190, 191, 192, 193, 194, 23,  42,  55,
    77,  195, 196, 197, 198, 199, 200, 201, 202, 203, 204, 205, 206, 24,  45,
    56,  70,  207, 208, 209, 210, 211, 212, 213, 214, 215, 216, 217, 218, 25,
    49,  58,  71,  219, 220, 221, 222, 223, 224, 225, 226, 227, 228, 229, 230,
    29,  67,  81,  231, 232, 233, 234, 235, 236, 237, 238, 239, 240, 241, 242,
    21,  30,  73,  243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254,
    255,
];

/// Inverse of `INDEX_LUT`: rank back to the (run << 4 | magnitude) byte.
#[rustfmt::skip]
pub const SYMBOL_LUT: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x21, 0x12, 0x31, 0x41, 0x05, 0x51,
    0x13, 0x61, 0x22, 0x71, 0x81, 0x06, 0x91, 0x32, 0xa1, 0xf0, 0x14, 0xb1,
    0xc1, 0xd1, 0x23, 0x42, 0x52, 0xe1, 0xf1, 0x15, 0x07, 0x62, 0x33, 0x72,
    0x24, 0x82, 0x92, 0x43, 0xa2, 0x53, 0xb2, 0x16, 0x34, 0xc2, 0x63, 0x73,
    0x25, 0xd2, 0x93, 0x83, 0x44, 0x54, 0xa3, 0xb3, 0xc3, 0x35, 0xd3, 0x94,
    0x17, 0x45, 0x84, 0x64, 0x55, 0x74, 0x26, 0xe2, 0x08, 0x75, 0xc4, 0xd4,
    0x65, 0xf2, 0x85, 0x95, 0xa4, 0xb4, 0x36, 0x46, 0x56, 0xe3, 0xa5, 0x09,
    0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10, 0x18, 0x19, 0x1a, 0x1b, 0x1c,
    0x1d, 0x1e, 0x1f, 0x20, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e,
    0x2f, 0x30, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f, 0x40,
    0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f, 0x50, 0x57, 0x58,
    0x59, 0x5a, 0x5b, 0x5c, 0x5d, 0x5e, 0x5f, 0x60, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70, 0x76, 0x77, 0x78, 0x79, 0x7a,
    0x7b, 0x7c, 0x7d, 0x7e, 0x7f, 0x80, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b,
    0x8c, 0x8d, 0x8e, 0x8f, 0x90, 0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b, 0x9c,
    0x9d, 0x9e, 0x9f, 0xa0, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad,
    0xae, 0xaf, 0xb0, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd,
    0xbe, 0xbf, 0xc0, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd,
    0xce, 0xcf, 0xd0, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xdb, 0xdc, 0xdd,
    0xde, 0xdf, 0xe0, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xeb, 0xec,
    0xed, 0xee, 0xef, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb,
    0xfc, 0xfd, 0xfe, 0xff,
];

/// Block contexts used for scan order, nonzero counts, and AC coefficients.
/// 0..2 are flat blocks (context = channel); 3..5 are directional and ignore
/// the channel.
pub const ORDER_CONTEXTS: usize = 6;

/// Contexts reserved for the per-block quant-field tokens.
pub const QUANT_FIELD_CONTEXTS: usize = 128;

/// Nonzero-count contexts per order context.
pub const NONZERO_CONTEXTS: usize = 32;

/// Zero-density AC coefficient contexts per order context.
pub const AC_DENSITY_CONTEXTS: usize = 120;

/// Total context count of the AC token stream.
pub const NUM_AC_CONTEXTS: usize =
    QUANT_FIELD_CONTEXTS + ORDER_CONTEXTS * (NONZERO_CONTEXTS + AC_DENSITY_CONTEXTS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luts_are_inverse() {
        for sym in 0..256 {
            assert_eq!(SYMBOL_LUT[INDEX_LUT[sym] as usize] as usize, sym);
        }
    }

    #[test]
    fn test_natural_order_is_permutation() {
        let mut seen = [false; BLOCK_SIZE];
        for &k in &NATURAL_COEFF_ORDER[..BLOCK_SIZE] {
            assert!(!seen[k], "duplicate entry {}", k);
            seen[k] = true;
        }
        assert!(NATURAL_COEFF_ORDER[BLOCK_SIZE..].iter().all(|&k| k == 63));
    }

    #[test]
    fn test_context_count() {
        assert_eq!(NUM_AC_CONTEXTS, 128 + 6 * (32 + 120));
    }

    #[test]
    fn test_dequant_matrices_symmetric() {
        for m in DEQUANT_MATRIX_DEFAULT.iter().chain(DEQUANT_MATRIX_HQ.iter()) {
            for u in 0..8 {
                for v in 0..8 {
                    assert_eq!(m[u * 8 + v], m[v * 8 + u]);
                }
            }
        }
    }
}
